//! Action execution with rollback
//!
//! Plans run sequentially with fixed pacing between actions. Before each
//! action the target component's state is captured; if the action fails
//! that state is restored. Every terminal outcome is appended to history
//! exactly once.

mod params;
mod runner;

pub use params::{ParameterStore, ReplicaController, RetrainingTrigger, Tunables};
pub use runner::{ActionExecutor, DEFAULT_ACTION_PACING};

use crate::models::{ActionParams, Component, ComponentState};
use anyhow::Result;
use async_trait::async_trait;

/// Applies actions to live components
#[async_trait]
pub trait ActionApplier: Send + Sync {
    /// Full state of a component, or `None` when it has nothing to restore
    async fn capture(&self, component: Component) -> Result<Option<ComponentState>>;

    /// Apply an action's parameters
    async fn apply(&self, params: &ActionParams) -> Result<()>;

    /// Put a component back into a captured state
    async fn restore(&self, state: &ComponentState) -> Result<()>;
}
