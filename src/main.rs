use anyhow::{Context, Result};
use clap::Parser;
use predict_probe::{ProbeArgs, logging};

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    logging::init();
    let args = ProbeArgs::parse();

    args.execute(std::io::stdout().lock())
        .await
        .with_context(|| format!("probe of {} failed", args.endpoint))?;
    Ok(())
}
