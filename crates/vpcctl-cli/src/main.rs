//! vpcctl - VPC management on a single Linux host.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use vpcctl_core::{Reconciler, StateStore};
use vpcctl_net::HostExecutor;

mod commands;

use commands::{Cli, Commands, Context};

const LOG_DIR: &str = "logs";
const LOG_FILE: &str = "logs/vpcctl.log";

fn main() {
    // usage problems are user errors (exit 1); --help and --version
    // render on stdout and exit 0
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(err) => {
            let code = i32::from(err.use_stderr());
            let _ = err.print();
            std::process::exit(code);
        }
    };

    if let Err(err) = init_logging(cli.debug) {
        eprintln!("warning: cannot open {LOG_FILE}: {err:#}");
    }

    if let Err(err) = run(cli) {
        let code = match err.downcast_ref::<vpcctl_core::Error>() {
            Some(core_err) => {
                tracing::error!("{core_err}");
                if let Some(hint) = core_err.hint() {
                    eprintln!("hint: {hint}");
                }
                core_err.exit_code()
            }
            None => {
                tracing::error!("{err:#}");
                1
            }
        };
        std::process::exit(code);
    }
}

fn run(cli: Cli) -> Result<()> {
    let store = StateStore::new(&cli.state_dir);
    let reconciler = Reconciler::new(
        HostExecutor::new(),
        store,
        Duration::from_secs(cli.lock_timeout),
    );
    let ctx = Context {
        reconciler,
        json: cli.json,
    };

    match cli.command {
        Commands::CreateVpc(args) => commands::create::execute(&ctx, args),
        Commands::AddSubnet(args) => commands::subnet::execute(&ctx, args),
        Commands::DeployApp(args) => commands::deploy::execute(&ctx, args),
        Commands::ApplyPolicy(args) => commands::policy::execute(&ctx, args),
        Commands::Peer(args) => commands::peer::execute(&ctx, args),
        Commands::Inspect(args) => commands::inspect::execute(&ctx, args),
        Commands::ListVpcs => commands::list::execute(&ctx),
        Commands::DeleteVpc(args) => commands::delete::execute(&ctx, args),
        Commands::TeardownAll => commands::teardown::execute(&ctx),
    }
}

/// Logs go to stderr and, append-only, to `logs/vpcctl.log`. The log
/// directory is created on first use.
fn init_logging(debug: bool) -> Result<()> {
    let default_filter = if debug {
        "vpcctl_cli=debug,vpcctl_core=debug,vpcctl_net=debug,info"
    } else {
        "info"
    };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));

    std::fs::create_dir_all(LOG_DIR)?;
    let file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(LOG_FILE)?;

    tracing_subscriber::registry()
        .with(filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_writer(std::io::stderr),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_ansi(false)
                .with_writer(Arc::new(file)),
        )
        .init();

    Ok(())
}
