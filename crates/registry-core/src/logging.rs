//! Process-wide logging and shutdown helpers, gated behind the `server`
//! feature the same way `rbp_core` gates its own copies — a library
//! consumer embedding the registry's crates shouldn't inherit a global
//! logger or a ctrl-c handler it didn't ask for.
#![cfg(feature = "server")]

use std::io::Write;
use std::sync::atomic::AtomicBool;
use std::sync::atomic::Ordering;

static INTERRUPTED: AtomicBool = AtomicBool::new(false);

/// Installs a combined terminal + file logger. Call once at binary
/// startup before any component logs a line.
pub fn log(log_path: &str) {
    use simplelog::ColorChoice;
    use simplelog::CombinedLogger;
    use simplelog::Config;
    use simplelog::LevelFilter;
    use simplelog::TermLogger;
    use simplelog::TerminalMode;
    use simplelog::WriteLogger;

    let file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(log_path)
        .expect("open log file");

    CombinedLogger::init(vec![
        TermLogger::new(
            LevelFilter::Info,
            Config::default(),
            TerminalMode::Mixed,
            ColorChoice::Auto,
        ),
        WriteLogger::new(LevelFilter::Debug, Config::default(), file),
    ])
    .expect("install logger");
}

/// Hard exit on ctrl-c, for tools with no graceful-shutdown path.
pub fn kys() {
    tokio::spawn(async {
        let _ = tokio::signal::ctrl_c().await;
        std::process::exit(130);
    });
}

/// Marks the process as interrupted without exiting. Long-running loops
/// poll [`interrupted`] between units of work and wind down on their own.
pub fn brb() {
    tokio::spawn(async {
        let _ = tokio::signal::ctrl_c().await;
        log::warn!("[registry] interrupt received, winding down");
        INTERRUPTED.store(true, Ordering::SeqCst);
    });
}

pub fn interrupted() -> bool {
    INTERRUPTED.load(Ordering::SeqCst)
}

/// Parses a Go-style duration string (`"30s"`, `"5m"`, `"1h"`) from an
/// environment variable, falling back to `default` when unset or
/// unparsable.
pub fn parse_duration(var: &str, default: std::time::Duration) -> std::time::Duration {
    let Ok(raw) = std::env::var(var) else {
        return default;
    };
    let raw = raw.trim();
    let (digits, unit) = raw.split_at(raw.find(|c: char| !c.is_ascii_digit()).unwrap_or(raw.len()));
    let Ok(value) = digits.parse::<u64>() else {
        return default;
    };
    match unit {
        "s" | "" => std::time::Duration::from_secs(value),
        "m" => std::time::Duration::from_secs(value * 60),
        "h" => std::time::Duration::from_secs(value * 3600),
        "ms" => std::time::Duration::from_millis(value),
        _ => default,
    }
}

/// Flushes stdout, matching the teacher's pre-exit drain.
pub fn flush() {
    let _ = std::io::stdout().flush();
}
