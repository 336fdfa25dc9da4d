use async_trait::async_trait;

use crate::error::Result;

/// Object path the agent is exported under.
pub const AGENT_PATH: &str = "/org/kyanos/agent";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Capability {
    KeyboardDisplay,
    NoInputNoOutput,
}

impl Capability {
    pub fn as_str(&self) -> &'static str {
        match self {
            Capability::KeyboardDisplay => "KeyboardDisplay",
            Capability::NoInputNoOutput => "NoInputNoOutput",
        }
    }
}

/// The daemon's agent manager.
#[async_trait]
pub trait AgentManager: Send + Sync {
    async fn register_agent(&self, path: &str, capability: Capability) -> Result<()>;
    async fn unregister_agent(&self, path: &str) -> Result<()>;
    async fn request_default_agent(&self, path: &str) -> Result<()>;
}

/// Unregisters any stale registration, then registers with the interactive profile,
/// falling back to the no-interaction one. Asking to be the default agent is best effort.
pub async fn register_agent<M>(manager: &M, path: &str) -> Result<Capability>
where
    M: AgentManager + ?Sized,
{
    if let Err(e) = manager.unregister_agent(path).await {
        tracing::debug!("No previous agent registration to drop: {}", e);
    }

    let capability = match manager.register_agent(path, Capability::KeyboardDisplay).await {
        Ok(()) => Capability::KeyboardDisplay,
        Err(e) => {
            tracing::warn!("KeyboardDisplay agent refused ({}), falling back to NoInputNoOutput", e);
            manager.register_agent(path, Capability::NoInputNoOutput).await?;
            Capability::NoInputNoOutput
        }
    };

    if let Err(e) = manager.request_default_agent(path).await {
        tracing::warn!("Could not become the default agent: {}", e);
    }

    tracing::info!("Pairing agent registered at {} as {}", path, capability.as_str());
    Ok(capability)
}
