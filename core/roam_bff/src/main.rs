use std::{
    net::{IpAddr, SocketAddr},
    time::Duration,
};

use clap::Parser;
use tracing::{info, warn};

mod config;
mod datalog;
mod dates;
mod error;
mod model;
mod parse;
mod routes;
mod stats;
mod upstream;

use config::{CategoryMatch, Config, DEFAULT_PEERS};

const DEFAULT_PORT: u16 = 3000;

#[derive(Parser, Debug)]
#[command(name = "roam_bff", version)]
struct Args {
    /// Listen address.
    ///
    /// Accepts:
    /// - ip:port (recommended), e.g. 127.0.0.1:3000
    /// - ip (implies port 3000), e.g. 127.0.0.1
    /// - localhost or localhost:port
    #[arg(long, env = "BFF_LISTEN", default_value = "127.0.0.1:3000")]
    listen: String,

    /// Roam graph API token. Requests fail with 500 while it is unset.
    #[arg(long, env = "ROAM_API_TOKEN", hide_env_values = true)]
    roam_api_token: Option<String>,

    /// Primary graph API base; `/{graph}/q` and `/{graph}/write` are appended.
    #[arg(long, env = "ROAM_API_BASE", default_value = config::DEFAULT_API_BASE)]
    api_base: String,

    /// Write fallback peers, tried in order (host:port or full base URL).
    #[arg(
        long,
        env = "ROAM_PEERS",
        value_delimiter = ',',
        default_values = DEFAULT_PEERS
    )]
    peers: Vec<String>,

    /// Page holding the category tree.
    #[arg(long, default_value = config::DEFAULT_CATEGORIES_PAGE)]
    categories_page: String,

    /// Block string of the container holding a day's timeline entries.
    #[arg(long, default_value = config::DEFAULT_TIMELINE_BLOCK)]
    timeline_block: String,

    /// Levels of nested children pulled under each category.
    #[arg(long, default_value_t = 2)]
    category_depth: usize,

    /// How entry tags are matched to categories.
    #[arg(long, value_enum, default_value = "leaf")]
    category_match: CategoryMatch,

    /// Day pages fetched concurrently by /timeline-stats.
    #[arg(long, default_value_t = 4)]
    stats_concurrency: usize,

    /// Extra attempts on the primary /q endpoint after a 404.
    #[arg(long, default_value_t = 1)]
    read_retries: usize,

    /// Per-request upstream timeout (seconds).
    #[arg(long, default_value_t = 30)]
    upstream_timeout_secs: u64,
}

impl Args {
    fn into_config(self) -> Config {
        let mut cfg = Config::new(self.roam_api_token);
        cfg.api_base = self.api_base.trim().trim_end_matches('/').to_string();
        cfg.peer_bases = self
            .peers
            .iter()
            .filter(|p| !p.trim().is_empty())
            .map(|p| config::peer_base(p))
            .collect();
        cfg.categories_page = self.categories_page;
        cfg.timeline_block = self.timeline_block;
        cfg.category_depth = self.category_depth;
        cfg.category_match = self.category_match;
        cfg.stats_concurrency = self.stats_concurrency.max(1);
        cfg.read_retries = self.read_retries;
        cfg.upstream_timeout = Duration::from_secs(self.upstream_timeout_secs.max(1));
        cfg
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "roam_bff=info,tower_http=info".into()),
        )
        .init();

    let args = Args::parse();
    let addr = parse_listen(&args.listen)?;
    let config = args.into_config();
    if config.api_token.is_none() {
        warn!("ROAM_API_TOKEN is not set; every /api/roam request will fail");
    }
    info!("config: {config:?}");

    let state = routes::AppState::new(config)?;
    let app = routes::router(state);

    info!("BFF listening on http://{addr}");
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    Ok(())
}

fn parse_listen(input: &str) -> anyhow::Result<SocketAddr> {
    let input = input.trim();
    if let Ok(addr) = input.parse::<SocketAddr>() {
        return Ok(addr);
    }

    if let Ok(ip) = input.parse::<IpAddr>() {
        return Ok(SocketAddr::new(ip, DEFAULT_PORT));
    }

    if input == "localhost" {
        return Ok(SocketAddr::new(IpAddr::from([127, 0, 0, 1]), DEFAULT_PORT));
    }

    if let Some(port_str) = input.strip_prefix("localhost:") {
        let port: u16 = port_str.parse().map_err(|_| {
            anyhow::anyhow!(
                "invalid --listen '{}': bad port. Example: 127.0.0.1:{}",
                input,
                DEFAULT_PORT
            )
        })?;
        return Ok(SocketAddr::new(IpAddr::from([127, 0, 0, 1]), port));
    }

    Err(anyhow::anyhow!(
        "invalid --listen '{}'. Use ip:port (e.g. 127.0.0.1:{}) or ip (e.g. 127.0.0.1).",
        input,
        DEFAULT_PORT
    ))
}

async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
    info!("shutdown requested");
}
