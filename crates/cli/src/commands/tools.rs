//! `mcplink tools` — launch a server script and print its tool catalog.

use std::path::Path;
use mcplink_agent::catalog;
use mcplink_config::AppConfig;
use mcplink_core::tool::{ToolDeclaration, ToolServer};

pub async fn run(script: &Path, config_path: &Path) -> Result<(), Box<dyn std::error::Error>> {
    let config =
        AppConfig::load_with_env(config_path).map_err(|e| format!("Failed to load config: {e}"))?;

    let server = mcplink_mcp::connect_script(script, &config.tool_server).await?;
    let discovered = catalog::discover(&server).await;
    if let Err(e) = server.close().await {
        tracing::warn!(error = %e, "Failed to close tool server");
    }
    let catalog = discovered?;

    println!();
    println!("  {} declares {} tool(s):", script.display(), catalog.len());
    println!();
    for declaration in catalog.iter() {
        println!("{}", describe(declaration));
    }
    println!();

    Ok(())
}

/// `  name(arg*, opt) — description`; required parameters are starred.
fn describe(declaration: &ToolDeclaration) -> String {
    let required: Vec<&str> = declaration.input_schema["required"]
        .as_array()
        .map(|r| r.iter().filter_map(|v| v.as_str()).collect())
        .unwrap_or_default();

    let params: Vec<String> = declaration.input_schema["properties"]
        .as_object()
        .map(|props| {
            props
                .keys()
                .map(|name| {
                    if required.contains(&name.as_str()) {
                        format!("{name}*")
                    } else {
                        name.clone()
                    }
                })
                .collect()
        })
        .unwrap_or_default();

    let mut line = format!("  {}({})", declaration.name, params.join(", "));
    if !declaration.description.is_empty() {
        line.push_str(" — ");
        line.push_str(&declaration.description);
    }
    line
}
