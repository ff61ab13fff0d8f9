//! Deciding how to launch a tool server script.
//!
//! The interpreter is picked from the file extension unless the
//! configuration names one explicitly.

use mcplink_core::error::ToolServerError;
use std::path::Path;

/// A fully resolved command line for a tool server process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerCommand {
    pub program: String,
    pub args: Vec<String>,
    pub env: Vec<(String, String)>,
}

impl ServerCommand {
    /// Resolve the command for `script`.
    ///
    /// `.py` runs under Python, `.js`/`.mjs`/`.cjs` under Node. An explicit
    /// `interpreter` (e.g. `"uv run"`) bypasses extension classification.
    pub fn for_script(script: &Path, interpreter: Option<&str>) -> Result<Self, ToolServerError> {
        let display = script.display().to_string();

        if !script.is_file() {
            return Err(ToolServerError::SpawnFailed(format!(
                "server script not found: {display}"
            )));
        }

        let mut words: Vec<String> = match interpreter.map(str::trim).filter(|i| !i.is_empty()) {
            Some(interpreter) => interpreter.split_whitespace().map(String::from).collect(),
            None => vec![default_interpreter(script)?.to_string()],
        };

        let program = words.remove(0);
        words.push(display);

        Ok(Self {
            program,
            args: words,
            env: Vec::new(),
        })
    }

    /// Append extra arguments after the script path.
    pub fn with_args(mut self, args: impl IntoIterator<Item = String>) -> Self {
        self.args.extend(args);
        self
    }

    /// Add environment variables for the child process.
    pub fn with_env(mut self, env: impl IntoIterator<Item = (String, String)>) -> Self {
        self.env.extend(env);
        self
    }
}

impl std::fmt::Display for ServerCommand {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.program)?;
        for arg in &self.args {
            write!(f, " {arg}")?;
        }
        Ok(())
    }
}

fn default_interpreter(script: &Path) -> Result<&'static str, ToolServerError> {
    let extension = script
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase);

    match extension.as_deref() {
        Some("py") => Ok(python()),
        Some("js" | "mjs" | "cjs") => Ok("node"),
        _ => Err(ToolServerError::UnsupportedScript(
            script.display().to_string(),
        )),
    }
}

fn python() -> &'static str {
    if cfg!(target_os = "windows") {
        "python"
    } else {
        "python3"
    }
}
