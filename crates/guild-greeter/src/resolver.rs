//! Greeting template resolution.
//!
//! The template is re-read from the parameter store on every call so an
//! operator's update takes effect on the next request. Callers that need to
//! avoid the read should cache the result themselves.

use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, warn};

use guild_core::GreetingConfig;
use guild_state::ParameterStore;

/// Placeholder replaced by the caller's name.
pub const NAME_SLOT: &str = "{name}";

/// Where a resolved template came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TemplateSource {
    Store,
    Fallback,
}

/// A greeting with a `{name}` substitution slot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GreetingTemplate {
    text: String,
    source: TemplateSource,
}

impl GreetingTemplate {
    pub fn new(text: impl Into<String>, source: TemplateSource) -> Self {
        Self {
            text: text.into(),
            source,
        }
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn source(&self) -> TemplateSource {
        self.source
    }

    /// Substitute `name` into the slot. A template without a slot is
    /// returned unchanged.
    pub fn render(&self, name: &str) -> String {
        self.text.replace(NAME_SLOT, name)
    }
}

/// Reads the greeting template from a parameter store.
#[derive(Clone)]
pub struct ConfigResolver {
    store: Arc<dyn ParameterStore>,
    key: String,
    fallback: String,
}

impl ConfigResolver {
    pub fn new(
        store: Arc<dyn ParameterStore>,
        key: impl Into<String>,
        fallback: impl Into<String>,
    ) -> Self {
        Self {
            store,
            key: key.into(),
            fallback: fallback.into(),
        }
    }

    pub fn from_config(store: Arc<dyn ParameterStore>, config: &GreetingConfig) -> Self {
        Self::new(store, &config.parameter, &config.fallback_template)
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    /// Fetch the current template. Never fails.
    pub fn resolve(&self) -> GreetingTemplate {
        match self.store.get(&self.key) {
            Ok(text) => {
                debug!(key = %self.key, "greeting template read from store");
                GreetingTemplate::new(text, TemplateSource::Store)
            }
            Err(e) => {
                warn!(key = %self.key, error = %e, "greeting parameter unavailable, using fallback");
                GreetingTemplate::new(self.fallback.clone(), TemplateSource::Fallback)
            }
        }
    }
}
