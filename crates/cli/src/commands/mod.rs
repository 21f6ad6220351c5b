pub mod chat;
pub mod daemon;
pub mod tasks;

use apexclaw_config::AppConfig;
use apexclaw_runtime::Runtime;
use std::sync::Arc;

use crate::console::ConsoleMessaging;

/// Load config and build a runtime talking to the configured endpoint.
pub fn build_runtime() -> Result<(AppConfig, Arc<Runtime>), Box<dyn std::error::Error>> {
    let config = AppConfig::load().map_err(|e| format!("Failed to load config: {e}"))?;

    // Fail early with setup instructions when no key is set
    if !config.has_api_key() && !config.api_url.contains("localhost") {
        eprintln!();
        eprintln!("  ERROR: No API key configured!");
        eprintln!();
        eprintln!("  Set one of these environment variables:");
        eprintln!("    export OPENROUTER_API_KEY='sk-or-v1-...'   (recommended)");
        eprintln!("    export OPENAI_API_KEY='sk-...'             (for OpenAI direct)");
        eprintln!("    export APEXCLAW_API_KEY='sk-...'           (generic)");
        eprintln!();
        eprintln!("  Or add it to your config file:");
        eprintln!("    {}", AppConfig::config_dir().join("config.toml").display());
        eprintln!();
        return Err("No API key found. See above for setup instructions.".into());
    }

    let client = apexclaw_providers::build_from_config(&config)?;
    let runtime = Runtime::new(&config, Arc::new(client), Arc::new(ConsoleMessaging::new()));
    Ok((config, runtime))
}
