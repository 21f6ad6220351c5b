//! `apexclaw daemon` — Run the heartbeat scheduler until interrupted.

use tokio_util::sync::CancellationToken;
use tracing::info;

pub async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let (config, runtime) = super::build_runtime()?;

    println!("ApexClaw Daemon — Starting heartbeat runtime");
    println!("   Model:     {}", config.default_model);
    println!("   Tasks:     {}", runtime.scheduler().len());
    println!(
        "   Heartbeat: {}",
        if config.heartbeat.enabled {
            "enabled"
        } else {
            "disabled"
        }
    );

    let shutdown = CancellationToken::new();
    let Some(handle) = runtime.start_scheduler(shutdown.clone()) else {
        return Err("Heartbeat is disabled in config; nothing to run.".into());
    };

    tokio::signal::ctrl_c().await?;
    info!("Shutdown requested");
    shutdown.cancel();
    handle.await?;
    Ok(())
}
