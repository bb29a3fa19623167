//! Operator console surface: `environment list|show <id>|refresh` and
//! `shutdown create|cancel`.
//!
//! Grounded on `crates/analysis/src/cli.rs` (`rbp-analysis`)'s CLI
//! shape — a `clap::Parser` subcommand enum fed through
//! `Query::try_parse_from`, a stdin loop with `quit`/`exit` to break —
//! generalized from analysis queries to operator commands over a
//! running [`crate::RegistryApp`]. Operator-only, not part of the
//! routing algorithms: every command here reads or nudges state the
//! bus-driven pipeline already owns.
use crate::RegistryApp;
use clap::error::ErrorKind;
use clap::Parser;
use registry_bus::messages::ShutdownTarget;
use registry_bus::messages::ShutdownTargetType;
use registry_core::FamilyId;
use registry_docs::Collection;
use std::io::Write;
use std::sync::Arc;

#[derive(Parser)]
#[command(name = "registry", author, version, about, long_about = None)]
enum Command {
    #[command(subcommand)]
    Environment(EnvironmentCommand),
    #[command(subcommand)]
    Shutdown(ShutdownCommand),
}

#[derive(clap::Subcommand)]
enum EnvironmentCommand {
    /// Lists family ids known to this process's in-memory fleet.
    List,
    /// Shows the network environment descriptor on file for `id`.
    Show {
        #[arg(required = true)]
        id: String,
    },
    /// Re-pulls every registered backend's family capacities.
    Refresh,
}

#[derive(clap::Subcommand)]
enum ShutdownCommand {
    /// Creates a shutdown intent. Each target is `backend:<id>` or `proxy:<id>`.
    Create {
        #[arg(required = true, value_delimiter = ',')]
        targets: Vec<String>,
        #[arg(long, default_value_t = 30)]
        countdown: u64,
        #[arg(long, default_value = "operator requested")]
        reason: String,
        #[arg(long)]
        fallback_family: Option<String>,
        #[arg(long)]
        force: bool,
    },
    /// Cancels a live intent and restores its targets to AVAILABLE.
    Cancel {
        #[arg(required = true)]
        intent_id: String,
    },
}

fn parse_target(raw: &str) -> Result<ShutdownTarget, String> {
    let (kind, id) = raw
        .split_once(':')
        .ok_or_else(|| format!("target {raw:?} must be backend:<id> or proxy:<id>"))?;
    let target_type = match kind {
        "backend" => ShutdownTargetType::Backend,
        "proxy" => ShutdownTargetType::Proxy,
        other => return Err(format!("unknown target kind {other:?} in {raw:?}")),
    };
    Ok(ShutdownTarget { service_id: id.to_string(), target_type })
}

async fn dispatch(app: &Arc<RegistryApp>, command: Command, now_millis: u64) -> Result<(), String> {
    match command {
        Command::Environment(EnvironmentCommand::List) => {
            let mut ids: Vec<String> = app.known_family_ids().iter().map(|id| id.to_string()).collect();
            ids.sort();
            if ids.is_empty() {
                println!("(no families registered yet)");
            }
            for id in ids {
                println!("{id}");
            }
            Ok(())
        }
        Command::Environment(EnvironmentCommand::Show { id }) => {
            let descriptor = app
                .environments
                .document(&id)
                .await
                .map_err(|err| format!("document store error: {err}"))?;
            match descriptor {
                Some(descriptor) => {
                    println!("id:           {}", descriptor.id);
                    println!("tag:          {}", descriptor.tag);
                    println!("modules:      {}", descriptor.modules.join(", "));
                    println!("description:  {}", descriptor.description);
                    println!("min_players:  {}", descriptor.min_players);
                    println!("max_players:  {}", descriptor.max_players);
                    println!("player_factor:{}", descriptor.player_factor);
                    Ok(())
                }
                None => Err(format!("no environment descriptor on file for {id:?}")),
            }
        }
        Command::Environment(EnvironmentCommand::Refresh) => {
            let refreshed = app.refresh_environments().await;
            println!("refreshed {refreshed} backend(s)");
            Ok(())
        }
        Command::Shutdown(ShutdownCommand::Create {
            targets,
            countdown,
            reason,
            fallback_family,
            force,
        }) => {
            let targets = targets
                .iter()
                .map(|raw| parse_target(raw))
                .collect::<Result<Vec<_>, _>>()?;
            let intent_id = app.shutdown.create_intent(
                targets,
                countdown,
                reason,
                fallback_family.map(|tag| FamilyId::from(tag.as_str())),
                force,
                now_millis,
            );
            println!("{intent_id}");
            Ok(())
        }
        Command::Shutdown(ShutdownCommand::Cancel { intent_id }) => {
            if app.shutdown.cancel_intent(&intent_id) {
                println!("cancelled {intent_id}");
                Ok(())
            } else {
                Err(format!("no live intent {intent_id:?}"))
            }
        }
    }
}

/// Parses and runs one console invocation, returning the process exit
/// code named in spec §6: 0 success, 1 unknown subcommand, 2 argument
/// error.
pub async fn run_once(app: &Arc<RegistryApp>, args: &[String]) -> i32 {
    let parsed = Command::try_parse_from(std::iter::once("registry".to_string()).chain(args.iter().cloned()));
    let command = match parsed {
        Ok(command) => command,
        Err(err) => {
            eprintln!("{err}");
            return match err.kind() {
                ErrorKind::InvalidSubcommand | ErrorKind::UnknownArgument => 1,
                _ => 2,
            };
        }
    };
    match dispatch(app, command, crate::wiring::now_millis()).await {
        Ok(()) => 0,
        Err(message) => {
            eprintln!("{message}");
            2
        }
    }
}

/// Interactive REPL over the same commands, for an operator attached
/// to a running process's stdin. Mirrors `CLI::run`'s loop exactly:
/// prompt, read a line, `quit`/`exit` to break, otherwise parse and
/// dispatch, printing any error without breaking the loop.
pub async fn run(app: Arc<RegistryApp>) {
    log::info!("[console] entering operator console");
    loop {
        print!("> ");
        let mut input = String::new();
        std::io::stdout().flush().unwrap();
        if std::io::stdin().read_line(&mut input).unwrap() == 0 {
            break;
        }
        match input.trim() {
            "" => continue,
            "quit" | "exit" => break,
            line => {
                let parsed =
                    Command::try_parse_from(std::iter::once("> ").chain(line.split_whitespace()));
                match parsed {
                    Ok(command) => {
                        if let Err(message) = dispatch(&app, command, crate::wiring::now_millis()).await {
                            eprintln!("{message}");
                        }
                    }
                    Err(err) => eprintln!("{err}"),
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn target_parses_backend_and_proxy_kinds() {
        let backend = parse_target("backend:b1").unwrap();
        assert_eq!(backend.target_type, ShutdownTargetType::Backend);
        assert_eq!(backend.service_id, "b1");

        let proxy = parse_target("proxy:p1").unwrap();
        assert_eq!(proxy.target_type, ShutdownTargetType::Proxy);
    }

    #[test]
    fn target_rejects_missing_kind() {
        assert!(parse_target("b1").is_err());
    }

    #[test]
    fn target_rejects_unknown_kind() {
        assert!(parse_target("widget:b1").is_err());
    }
}
