//! Default initializers for the weights and biases of model parameters.
use crate::config::DefaultsConfig;
use crate::{Initializer, Result};
use std::sync::Arc;

/// The initializers used for weights and biases when a layer does not specify one.
///
/// This is plain configuration that gets passed to the code building layers. An initializer
/// given explicitly to a layer always wins over these defaults, resolving that is left to the
/// layer code.
#[derive(Debug, Clone, Default)]
pub struct InitDefaults {
    weight: Option<Arc<dyn Initializer>>,
    bias: Option<Arc<dyn Initializer>>,
}

impl InitDefaults {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces both defaults, `None` clears the corresponding default.
    pub fn set(
        &mut self,
        weight: Option<Arc<dyn Initializer>>,
        bias: Option<Arc<dyn Initializer>>,
    ) {
        tracing::debug!(
            weight = weight.as_ref().map(|i| i.name()),
            bias = bias.as_ref().map(|i| i.name()),
            "setting default initializers"
        );
        self.weight = weight;
        self.bias = bias;
    }

    pub fn weight(&self) -> Option<&Arc<dyn Initializer>> {
        self.weight.as_ref()
    }

    pub fn bias(&self) -> Option<&Arc<dyn Initializer>> {
        self.bias.as_ref()
    }

    pub fn from_config(config: &DefaultsConfig) -> Result<Self> {
        let weight = config.weight.as_ref().map(|c| c.build()).transpose()?;
        let bias = config.bias.as_ref().map(|c| c.build()).transpose()?;
        Ok(Self { weight, bias })
    }
}
