//! CLI command implementations.

pub mod cluster;
pub mod item;
pub mod list;
pub mod node;
pub mod nodes;

use clap::Args;
use shoplist_client::{ApiConfig, ShoppingApi, TcpReplicaTransport};
use std::path::PathBuf;

/// Error type shared by the commands.
pub type CliResult<T> = Result<T, Box<dyn std::error::Error>>;

/// How to reach a cluster.
#[derive(Debug, Args)]
pub struct ConnectArgs {
    /// Seed replica endpoints (host:port), comma separated
    #[arg(long, value_delimiter = ',', default_value = "127.0.0.1:5000")]
    pub seeds: Vec<String>,

    /// Number of shards in the cluster
    #[arg(long, default_value_t = 1)]
    pub shards: u32,

    /// Local cache file; kept in memory if omitted
    #[arg(long)]
    pub cache: Option<PathBuf>,
}

impl ConnectArgs {
    /// Builds an API for these settings.
    pub fn api(&self) -> CliResult<ShoppingApi<TcpReplicaTransport>> {
        let mut config = ApiConfig::new(self.seeds.clone(), self.shards);
        if let Some(path) = &self.cache {
            config = config.with_cache_path(path.clone());
        }
        Ok(ShoppingApi::connect(config)?)
    }
}

/// Blocks until the process receives Ctrl-C.
pub fn wait_for_ctrl_c() -> CliResult<()> {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;
    runtime.block_on(tokio::signal::ctrl_c())?;
    Ok(())
}
