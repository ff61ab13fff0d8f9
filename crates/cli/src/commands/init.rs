//! `mcplink init` — write a default config file.

use std::path::Path;
use mcplink_config::AppConfig;

pub fn run(config_path: &Path, force: bool) -> Result<(), Box<dyn std::error::Error>> {
    if write_default(config_path, force)? {
        println!("✅ Created config at: {}", config_path.display());
        println!("\n📝 Next steps:");
        println!("   1. Add your API key to the file (or set MCPLINK_API_KEY / OPENAI_API_KEY)");
        println!("   2. Run: mcplink chat path/to/server.py\n");
    } else {
        println!("⚠️  Config already exists at: {}", config_path.display());
        println!("   Edit it manually, or re-run with --force to overwrite.");
    }
    Ok(())
}

/// Returns false when the file exists and `force` is off.
fn write_default(config_path: &Path, force: bool) -> std::io::Result<bool> {
    if config_path.exists() && !force {
        return Ok(false);
    }

    if let Some(dir) = config_path.parent() {
        std::fs::create_dir_all(dir)?;
    }
    std::fs::write(config_path, AppConfig::default_toml())?;
    Ok(true)
}
