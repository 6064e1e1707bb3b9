//! `devloop config`: configuration management commands.

use devloop_config::AppConfig;

/// Print where the config lives and what the defaults look like.
pub fn show() {
    let path = AppConfig::config_path();
    let state = if path.exists() { "found" } else { "not created yet" };
    println!("# Config file: {} ({state})", path.display());
    println!("# Defaults:");
    println!();
    print!("{}", AppConfig::default_toml());
}

pub fn validate() -> Result<(), Box<dyn std::error::Error>> {
    println!("Validating configuration...");

    let config = match AppConfig::load() {
        Ok(config) => config,
        Err(e) => {
            println!("   Config error: {e}");
            return Err(e.into());
        }
    };
    println!("   Config parsed successfully");

    if !config.has_api_key() {
        println!("   Warning: no API key set (set GEMINI_API_KEY, OPENAI_API_KEY or DEVLOOP_API_KEY)");
    }

    println!();
    println!("   Provider:        {}", config.default_provider);
    println!("   Model:           {}", config.default_model);
    println!("   Fix attempts:    {}", config.agent.max_fix_attempts);
    println!("   Tool rounds:     {}", config.agent.max_tool_rounds);
    println!("   Create command:  {}", config.project.create_command);
    println!("   Serve command:   {}", config.project.serve_command);
    Ok(())
}
