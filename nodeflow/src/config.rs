//! Runtime configuration: flags first, then environment, then defaults.

use anyhow::{Context, Result};
use clap::Parser;
use std::net::SocketAddr;
use std::path::PathBuf;

pub const DEFAULT_ADDR: &str = "127.0.0.1:3000";
pub const DEFAULT_DATA_PATH: &str = "data/items.json";

#[derive(Parser, Debug, Default)]
#[command(name = "nodeflow")]
#[command(about = "Ordered tree of items and groups with drag-and-drop moves")]
pub struct Cli {
    /// Listen address (env NODEFLOW_ADDR)
    #[arg(short, long)]
    pub addr: Option<String>,

    /// Item records file (env NODEFLOW_DATA)
    #[arg(short, long)]
    pub data: Option<PathBuf>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Config {
    pub addr: SocketAddr,
    pub data_path: PathBuf,
}

impl Config {
    pub fn load(cli: Cli) -> Result<Self> {
        Self::resolve(cli, |key| std::env::var(key).ok())
    }

    fn resolve(cli: Cli, env: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let addr = cli
            .addr
            .or_else(|| env("NODEFLOW_ADDR"))
            .unwrap_or_else(|| DEFAULT_ADDR.to_string());
        let addr = addr
            .parse()
            .with_context(|| format!("invalid listen address '{addr}'"))?;
        let data_path = cli
            .data
            .or_else(|| env("NODEFLOW_DATA").map(PathBuf::from))
            .unwrap_or_else(|| PathBuf::from(DEFAULT_DATA_PATH));
        Ok(Self { addr, data_path })
    }
}
