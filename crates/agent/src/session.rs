//! A chat session: one tool server connection, its catalog, and the engine.
//!
//! `open` performs discovery and fails fast; `close` shuts the server down.
//! After `close`, turns that need a tool fail with `NotConnected`.

use std::path::Path;
use std::sync::Arc;
use mcplink_config::AppConfig;
use mcplink_core::error::Error;
use mcplink_core::event::DomainEvent;
use mcplink_core::provider::Provider;
use mcplink_core::tool::{ToolCatalog, ToolServer};
use tokio::sync::broadcast;
use tracing::{info, warn};
use crate::catalog;
use crate::dispatcher::ToolDispatcher;
use crate::loop_runner::{AgentLoop, TurnOutcome};

pub struct Session {
    server: Option<Arc<dyn ToolServer>>,
    agent: AgentLoop,
}

impl Session {
    /// Discover the server's tools and build the engine.
    ///
    /// The server is closed again if discovery fails.
    pub async fn open(
        server: Arc<dyn ToolServer>,
        provider: Arc<dyn Provider>,
        config: &AppConfig,
    ) -> Result<Self, Error> {
        let catalog = match catalog::discover(server.as_ref()).await {
            Ok(catalog) => catalog,
            Err(e) => {
                if let Err(close_err) = server.close().await {
                    warn!(error = %close_err, "Failed to close tool server after discovery error");
                }
                return Err(e);
            }
        };

        info!(
            server = server.name(),
            tools = catalog.len(),
            model = %config.model,
            "Session opened"
        );

        let dispatcher = ToolDispatcher::new(server.clone(), catalog);
        let agent = AgentLoop::from_config(provider, dispatcher, config);

        Ok(Self {
            server: Some(server),
            agent,
        })
    }

    /// Launch `script` as a stdio tool server and open a session on it.
    pub async fn launch(
        script: &Path,
        provider: Arc<dyn Provider>,
        config: &AppConfig,
    ) -> Result<Self, Error> {
        let server = mcplink_mcp::connect_script(script, &config.tool_server).await?;
        Self::open(Arc::new(server), provider, config).await
    }

    pub async fn process_turn(&mut self, user_text: &str) -> Result<TurnOutcome, Error> {
        self.agent.process_turn(user_text).await
    }

    pub fn catalog(&self) -> &ToolCatalog {
        self.agent.catalog()
    }

    pub fn agent(&self) -> &AgentLoop {
        &self.agent
    }

    pub fn agent_mut(&mut self) -> &mut AgentLoop {
        &mut self.agent
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Arc<DomainEvent>> {
        self.agent.event_bus().subscribe()
    }

    pub fn is_open(&self) -> bool {
        self.server.is_some()
    }

    /// Shut down the tool server. Safe to call more than once.
    pub async fn close(&mut self) -> Result<(), Error> {
        self.agent.dispatcher_mut().close();

        let Some(server) = self.server.take() else {
            return Ok(());
        };

        server.close().await?;
        info!(server = server.name(), "Session closed");
        Ok(())
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        if self.server.is_some() {
            warn!("Session dropped without close; the server process is killed on drop");
        }
    }
}
