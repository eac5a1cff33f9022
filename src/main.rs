use anyhow::Result;
use clap::Parser;
use recgate::{Config, Gateway};
use tracing::info;

#[derive(Parser)]
#[command(name = "recgate", about = "Recording-session gateway for a SIP/radio node")]
struct Args {
    /// Config file base path (without extension)
    #[arg(short, long, default_value = "config/recgate")]
    config: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt::init();

    let args = Args::parse();
    let cfg = Config::load(&args.config)?;

    info!("recgate v{}", env!("CARGO_PKG_VERSION"));
    info!("Terminal {}", cfg.gateway.terminal_id);
    info!("Recorder at {}", cfg.recorder.address);

    let gateway = Gateway::new(cfg).await?;
    gateway.start().await?;

    tokio::signal::ctrl_c().await?;
    gateway.shutdown().await;

    Ok(())
}
