use anyhow::Result;

use ragent::config::RagentConfig;
use ragent::tools::Toolbox;

/// Connect to every configured tool server and print what it offers.
pub async fn list(config: &RagentConfig) -> Result<()> {
    if config.tools.servers.is_empty() {
        println!("No tool servers configured. Add [[tools.servers]] entries to config.toml.");
        return Ok(());
    }

    let toolbox = Toolbox::from_config(&config.tools)?;
    let init = toolbox.init().await;

    for client in toolbox.clients() {
        println!("{} ({})", client.name(), client.state().as_str());
        for tool in client.list_tools() {
            let summary = tool.description.lines().next().unwrap_or_default();
            println!("  - {}: {}", tool.name, summary);
        }
    }

    toolbox.close().await?;
    init?;
    Ok(())
}
