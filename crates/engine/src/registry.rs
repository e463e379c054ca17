//! Step registry
//!
//! A name-indexed catalog of step handlers. Registration is open: plugin
//! handlers participate in validation, linting, listing and execution
//! exactly like the built-ins.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde_yaml::{Mapping, Value};

use flowreplay_common::{Error, Result, VarScope};

use crate::artifacts::ArtifactManager;
use crate::driver::{Driver, Locator};
use crate::resolver::SelectorResolver;

/// Step metadata for `list-steps` and documentation.
#[derive(Debug, Clone)]
pub struct StepInfo {
    pub name: &'static str,
    pub description: &'static str,
    pub category: &'static str,
}

/// Mutable per-step execution context handed to handlers.
pub struct StepContext<'a> {
    pub resolver: &'a SelectorResolver,
    pub vars: &'a mut VarScope,
    pub artifacts: Option<&'a ArtifactManager>,
    /// Browser console errors drained so far in this run
    pub console_errors: &'a mut Vec<String>,
    /// Diagnostics surfaced on the StepResult and in runner.log
    pub notes: &'a mut Vec<String>,
    /// Per-step timeout budget in milliseconds
    pub timeout_ms: u64,
    /// 1-based ordinal of the executing step
    pub ordinal: usize,
}

impl StepContext<'_> {
    /// Resolve a selector under this step's budget, folding resolver
    /// diagnostics (fallbacks, healing) into the step notes.
    pub async fn resolve(
        &mut self,
        driver: &dyn Driver,
        by: &flowreplay_common::By,
        frame: Option<&str>,
    ) -> Result<Locator> {
        let resolution = self.resolver.resolve(driver, by, frame, self.timeout_ms).await?;
        self.notes.extend(resolution.notes);
        Ok(resolution.locator)
    }

    pub fn note(&mut self, text: impl Into<String>) {
        self.notes.push(text.into());
    }
}

/// A step handler: executes the operation and validates its payload.
#[async_trait]
pub trait StepHandler: Send + Sync {
    async fn execute(
        &self,
        driver: &dyn Driver,
        params: &Mapping,
        ctx: &mut StepContext<'_>,
    ) -> Result<()>;

    /// Typed payload check used by `validate` and `lint`.
    fn validate(&self, params: &Mapping) -> Result<()>;

    fn info(&self) -> StepInfo;
}

/// Deserialize a step payload into its typed params struct.
pub fn from_params<T: DeserializeOwned>(params: &Mapping) -> Result<T> {
    serde_yaml::from_value(Value::Mapping(params.clone())).map_err(|e| Error::Schema {
        message: e.to_string(),
        location: "step payload".to_string(),
        line: None,
    })
}

/// Name-indexed handler catalog.
#[derive(Default, Clone)]
pub struct StepRegistry {
    handlers: BTreeMap<String, Arc<dyn StepHandler>>,
}

impl StepRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handler. Re-registering a name replaces the previous
    /// handler; plugins may override built-ins.
    pub fn register(&mut self, handler: Arc<dyn StepHandler>) {
        let name = handler.info().name;
        if self.handlers.contains_key(name) {
            tracing::warn!("step '{}' re-registered, replacing previous handler", name);
        }
        self.handlers.insert(name.to_string(), handler);
    }

    pub fn get(&self, name: &str) -> Result<Arc<dyn StepHandler>> {
        self.handlers.get(name).cloned().ok_or_else(|| Error::UnknownStep {
            name: name.to_string(),
            registered: self.names().join(", "),
        })
    }

    pub fn has(&self, name: &str) -> bool {
        self.handlers.contains_key(name)
    }

    pub fn names(&self) -> Vec<String> {
        self.handlers.keys().cloned().collect()
    }

    /// Metadata for every registered step, sorted by name.
    pub fn list(&self) -> Vec<StepInfo> {
        self.handlers.values().map(|h| h.info()).collect()
    }
}
