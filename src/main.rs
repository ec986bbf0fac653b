use std::net::SocketAddr;
use std::path::PathBuf;

use clap::Parser;
use tracing::info;

use trailhead::tours::{build_app, memory::MemoryServices};
use trailhead::{AppConfig, Error, Server, init_logging};

/// Tour-booking web service.
#[derive(Debug, Parser)]
#[command(name = "trailhead", version, about)]
struct Args {
    /// TOML configuration file. Defaults apply when omitted.
    #[arg(short, long, env = "TRAILHEAD_CONFIG")]
    config: Option<PathBuf>,

    /// Listen address, overriding `host`/`port` from config and environment.
    #[arg(short, long)]
    addr: Option<SocketAddr>,

    /// Directory of static assets served ahead of the pipeline.
    #[arg(long)]
    static_dir: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<(), Error> {
    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => AppConfig::load(path)?,
        None => AppConfig::default(),
    }
    .with_env_overrides();
    if let Some(dir) = args.static_dir {
        config.static_dir = Some(dir);
    }

    init_logging(config.env);

    let addr = match args.addr {
        Some(addr) => addr,
        None => config.addr()?,
    };
    info!(env = ?config.env, config = ?args.config, "starting");

    let services = MemoryServices::seeded().services(config.public_url.clone());
    Server::bind(addr).serve(build_app(&config, services)).await
}
