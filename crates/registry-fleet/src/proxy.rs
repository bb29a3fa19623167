//! A registered frontend node. Proxies are the sole source of player
//! requests and the sole target of route commands.
use dashmap::DashSet;
use registry_core::PlayerId;
use registry_core::ProxyId;
use std::sync::atomic::AtomicU64;
use std::sync::atomic::Ordering;

#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum ProxyStatus {
    Registering,
    Available,
    Evacuating,
    Unavailable,
}

/// A registered proxy and the players it currently carries.
pub struct Proxy {
    id: ProxyId,
    status: std::sync::Mutex<ProxyStatus>,
    last_heartbeat_millis: AtomicU64,
    players: DashSet<PlayerId>,
}

impl Proxy {
    pub fn new(id: ProxyId, now_millis: u64) -> Self {
        Self {
            id,
            status: std::sync::Mutex::new(ProxyStatus::Registering),
            last_heartbeat_millis: AtomicU64::new(now_millis),
            players: DashSet::new(),
        }
    }

    pub fn id(&self) -> &ProxyId {
        &self.id
    }

    pub fn status(&self) -> ProxyStatus {
        *self.status.lock().unwrap()
    }

    pub fn set_status(&self, status: ProxyStatus) {
        *self.status.lock().unwrap() = status;
    }

    pub fn touch_heartbeat(&self, now_millis: u64) {
        self.last_heartbeat_millis.store(now_millis, Ordering::Relaxed);
    }

    pub fn heartbeat_age_millis(&self, now_millis: u64) -> u64 {
        now_millis.saturating_sub(self.last_heartbeat_millis.load(Ordering::Relaxed))
    }

    pub fn attach_player(&self, player_id: PlayerId) {
        self.players.insert(player_id);
    }

    pub fn detach_player(&self, player_id: &PlayerId) {
        self.players.remove(player_id);
    }

    pub fn players(&self) -> Vec<PlayerId> {
        self.players.iter().map(|entry| entry.clone()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn attach_and_detach_player() {
        let proxy = Proxy::new(ProxyId::from("p1"), 0);
        let player = PlayerId::from("player-1");
        proxy.attach_player(player.clone());
        assert_eq!(proxy.players(), vec![player.clone()]);
        proxy.detach_player(&player);
        assert!(proxy.players().is_empty());
    }
}
