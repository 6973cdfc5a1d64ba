//! `parley serve`: start the HTTP gateway.

use parley_config::AppConfig;

pub async fn run(port_override: Option<u16>) -> Result<(), Box<dyn std::error::Error>> {
    let mut config = AppConfig::load().map_err(|e| format!("Failed to load config: {e}"))?;

    if let Some(port) = port_override {
        config.gateway.port = port;
    }

    println!("Parley gateway");
    println!("   Listening: {}:{}", config.gateway.host, config.gateway.port);
    println!("   Database:  {}", config.database.path);
    println!("   Primary:   {} ({})", config.llm.model, config.llm.base_url);

    parley_gateway::start(config).await?;

    Ok(())
}
