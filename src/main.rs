use std::io::Read;

use anyhow::Context;
use tracing::info;
use tracing_subscriber::EnvFilter;

use arti_lock::config::Config;
use arti_lock::manifest::ResolutionRequest;
use arti_lock::resolve::ResolutionRun;

/// Reads a resolution request as JSON from stdin, and writes the manifest as JSON to stdout.
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let config = Config::load()?;

    let mut input = String::new();
    std::io::stdin().read_to_string(&mut input)
        .context("reading the resolution request from stdin")?;
    let request: ResolutionRequest = serde_json::from_str(&input)
        .context("parsing the resolution request")?;

    let manifest = ResolutionRun::new(config).run(&request).await?;

    println!("{}", serde_json::to_string_pretty(&manifest)?);
    info!("wrote manifest for {} build units", manifest.len());
    Ok(())
}
