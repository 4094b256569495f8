//! Shared initialization logic for server and CLI modes.

use anyhow::Result;
use std::sync::Arc;

use crate::collaborators::Collaborators;
use crate::config::{ConfigProvider, EnvConfig};
use crate::mcp::{SkyTools, ToolRegistry};

/// Application context holding configuration, tools and the registry.
///
/// Shared between the transports and CLI commands.
pub struct AppContext {
    pub config: Arc<dyn ConfigProvider>,
    pub tools: SkyTools,
    pub registry: Arc<ToolRegistry>,
}

impl AppContext {
    /// Context over the live process environment with the default
    /// collaborators.
    pub fn new() -> Result<Self> {
        let config: Arc<dyn ConfigProvider> = Arc::new(EnvConfig);
        let collaborators = Collaborators::from_config(config.as_ref())?;
        Self::with_parts(config, collaborators)
    }

    pub fn with_parts(config: Arc<dyn ConfigProvider>, collaborators: Collaborators) -> Result<Self> {
        tracing::info!("Using assets dir: {}", config.assets_dir().display());

        let tools = SkyTools::new(config.clone(), collaborators);
        let registry = Arc::new(ToolRegistry::standard(tools.clone())?);
        tracing::debug!("Registered {} tools", registry.len());

        Ok(Self {
            config,
            tools,
            registry,
        })
    }
}
