//! portmgrd daemon entry point.
//!
//! Loads configuration, initializes logging, connects to Redis and runs the
//! port manager until SIGINT/SIGTERM.

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tracing::{error, info};

use sonic_cfgmgr_common::daemon::serve;
use sonic_cfgmgr_common::logging::init_logging;
use sonic_cfgmgr_common::{
    ConfigOverrides, DaemonConfig, DryRunShell, RedisStores, ShellExecutor, SystemShell,
};
use sonic_portmgrd::PortMgr;

const DAEMON_NAME: &str = "portmgrd";

/// Port configuration manager daemon.
#[derive(Debug, Parser)]
#[command(name = DAEMON_NAME, version, about)]
struct Args {
    /// Configuration file [default: /etc/sonic/portmgrd.toml]
    #[arg(long)]
    config: Option<PathBuf>,

    /// Redis host
    #[arg(long)]
    redis_host: Option<String>,

    /// Redis port
    #[arg(long)]
    redis_port: Option<u16>,

    /// Log level used when RUST_LOG is unset
    #[arg(long)]
    log_level: Option<String>,

    /// Log commands instead of running them
    #[arg(long)]
    dry_run: bool,

    /// Do not listen for kernel link events
    #[arg(long)]
    no_netlink: bool,
}

impl Args {
    fn overrides(&self) -> ConfigOverrides {
        ConfigOverrides {
            redis_host: self.redis_host.clone(),
            redis_port: self.redis_port,
            log_level: self.log_level.clone(),
            dry_run: self.dry_run,
        }
    }
}

async fn run(args: Args) -> anyhow::Result<()> {
    let path = args
        .config
        .clone()
        .unwrap_or_else(|| PathBuf::from(DaemonConfig::default_path(DAEMON_NAME)));
    let mut config = DaemonConfig::load_or_default(&path)?;
    config.apply_overrides(&args.overrides());

    init_logging(&config.daemon.log_level)?;
    config.validate()?;

    info!("--- Starting {} ---", DAEMON_NAME);

    let stores = RedisStores::connect(&config)
        .await
        .context("connecting to redis")?;
    let (config_db, appl_db, state_db) = stores.as_table_stores();

    let shell: Arc<dyn ShellExecutor> = if config.daemon.dry_run {
        info!("Dry run: commands are logged, not executed");
        Arc::new(DryRunShell::new())
    } else {
        Arc::new(SystemShell)
    };

    let mgr = PortMgr::new(config_db, appl_db, state_db, shell)
        .with_retry_policy(config.daemon.retry_policy);

    serve(mgr, &stores, &config, !args.no_netlink).await?;
    Ok(())
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    let args = Args::parse();

    match run(args).await {
        Ok(()) => {
            info!("{} exiting normally", DAEMON_NAME);
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!("{} error: {:#}", DAEMON_NAME, e);
            eprintln!("{}: {:#}", DAEMON_NAME, e);
            ExitCode::FAILURE
        }
    }
}
