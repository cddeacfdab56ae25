//! `rest2mqtt check`: validate the configuration without connecting.

use rest2mqtt_core::SubscriptionRegistry;

use crate::cli::GlobalOpts;
use crate::error::CliError;

pub fn handle(global: &GlobalOpts) -> Result<(), CliError> {
    let config = rest2mqtt_config::load_bridge_config(&global.config)?;

    println!("{}: OK", global.config.display());
    println!("broker {}:{}", config.mqtt.host, config.mqtt.port);

    let mut registry = SubscriptionRegistry::new();
    for api in &config.apis {
        println!();
        println!("api {} ({})", api.name, api.base_url);
        println!("  control    {}", api.control_topic());

        for (key, _) in api.subscribe_endpoints() {
            let filter = registry.register(api, key)?;
            println!("  subscribe  {filter} -> {key}");
        }
        for (key, endpoint) in api.on_start_endpoints() {
            println!("  on-start   {key} -> {}", api.topic(&endpoint.mqtt.topic));
        }
    }

    println!();
    println!(
        "{} API(s), {} subscription(s)",
        config.apis.len(),
        registry.len()
    );
    Ok(())
}
