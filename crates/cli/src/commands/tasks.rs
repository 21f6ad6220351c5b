//! `apexclaw tasks` — Inspect the durable task file without a model.

use apexclaw_config::AppConfig;
use apexclaw_workflow::{HeartbeatScheduler, HeartbeatStore, SchedulerSettings};

fn load() -> Result<HeartbeatScheduler, Box<dyn std::error::Error>> {
    let config = AppConfig::load().map_err(|e| format!("Failed to load config: {e}"))?;
    Ok(HeartbeatScheduler::load(
        HeartbeatStore::new(config.heartbeat.resolved_path()),
        SchedulerSettings::from_config(&config.heartbeat),
    ))
}

pub fn list() -> Result<(), Box<dyn std::error::Error>> {
    println!("{}", load()?.list());
    Ok(())
}

pub fn cancel(label: &str) -> Result<(), Box<dyn std::error::Error>> {
    if load()?.cancel(label) {
        println!("Cancelled \"{label}\".");
        Ok(())
    } else {
        Err(format!("No scheduled task named \"{label}\".").into())
    }
}
