//! Binary entry point: `registry-server` serves the registry by
//! default, or drops into the operator console against a freshly
//! connected process when invoked with a `console` subcommand.
//!
//! Mirrors `bin/backend/src/main.rs` (`rbp-server`)'s thin
//! `log(); kys(); brb(); run().await.unwrap();` shape, generalized with
//! a `clap` subcommand so the same binary also serves spec §6's
//! console surface.
use clap::Parser;
use clap::Subcommand;
use std::sync::Arc;

#[derive(Parser)]
#[command(name = "registry-server", author, version, about)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Runs the registry process (default).
    Serve,
    /// Connects to the same stores as `serve` and runs one console
    /// command, or an interactive REPL if none is given.
    Console {
        #[arg(trailing_var_arg = true)]
        args: Vec<String>,
    },
}

fn log_path() -> String {
    std::env::var("REGISTRY_LOG_PATH").unwrap_or_else(|_| "registry-server.log".to_string())
}

#[tokio::main]
async fn main() {
    match Cli::parse().command.unwrap_or(Commands::Serve) {
        Commands::Serve => {
            registry_core::logging::log(&log_path());
            registry_core::logging::kys();
            registry_core::logging::brb();
            registry_server::run().await.unwrap();
        }
        Commands::Console { args } => {
            registry_core::logging::log(&log_path());
            let config = registry_core::RegistryConfig::from_env();
            let app = registry_server::RegistryApp::connect(config)
                .await
                .expect("connect to routing store and document store");
            let app = Arc::new(app);
            if args.is_empty() {
                registry_server::console::run(app).await;
            } else {
                let code = registry_server::console::run_once(&app, &args).await;
                registry_core::logging::flush();
                std::process::exit(code);
            }
        }
    }
}
