//! Assay Daemon - evidence-gated reasoning server
//!
//! Speaks JSON-RPC on stdin/stdout. Logs go to stderr only.

use anyhow::{Context, Result};
use assay_common::{AssayConfig, AssayPaths, Tools};
use clap::Parser;
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "assayd")]
#[command(about = "Assay - evidence-gated reasoning server over stdio", long_about = None)]
#[command(version)]
struct Args {
    /// Project root holding the .assay/ directory
    #[arg(long, env = "ASSAY_PROJECT_ROOT")]
    root: Option<PathBuf>,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let args = Args::parse();
    let root = match args.root {
        Some(root) => root,
        None => std::env::current_dir().context("Failed to resolve current directory")?,
    };

    let config = AssayConfig::load(&AssayPaths::new(&root).config_path()).unwrap_or_default();
    let filter = EnvFilter::try_from_env("ASSAY_LOG")
        .or_else(|_| EnvFilter::try_new(&config.log_level))
        .unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    info!("Assay Daemon v{} starting in {}", env!("CARGO_PKG_VERSION"), root.display());

    let mut tools = Tools::open(&root)
        .with_context(|| format!("Failed to open project at {}", root.display()))?;

    let stdin = tokio::io::BufReader::new(tokio::io::stdin());
    assayd::serve(&mut tools, stdin, tokio::io::stdout()).await?;

    info!("Assay Daemon stopped");
    Ok(())
}
