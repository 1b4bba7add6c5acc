//! Serializable descriptions of initializers.
//!
//! ```rust
//! use candle_init::{DefaultsConfig, InitDefaults};
//! # fn main() -> candle_init::Result<()> {
//! let config = DefaultsConfig::from_json(
//!     r#"{"weight": {"kind": "kaiming", "nonlinearity": "leaky_relu", "param": 0.2}, "bias": null}"#,
//! )?;
//! let defaults = InitDefaults::from_config(&config)?;
//! assert_eq!(defaults.weight().map(|i| i.name()), Some("kaiming"));
//! assert!(defaults.bias().is_none());
//! # Ok(()) }
//! ```
use crate::init::{FanInOut, NormalOrUniform};
use crate::{ArrayInit, Bilinear, Error, Init, Initializer, NonLinearity, Result};
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, serde::Deserialize, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Distribution {
    Normal,
    #[default]
    Uniform,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, serde::Deserialize, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Fan {
    #[default]
    FanIn,
    FanOut,
}

fn default_nonlinearity() -> String {
    "relu".to_string()
}

/// An initializer description, tagged by `kind`.
#[derive(Debug, Clone, PartialEq, serde::Deserialize, serde::Serialize)]
#[serde(tag = "kind", rename_all = "snake_case", deny_unknown_fields)]
pub enum InitConfig {
    Bilinear,
    Array {
        shape: Vec<usize>,
        values: Vec<f64>,
    },
    Const {
        value: f64,
    },
    Uniform {
        lo: f64,
        up: f64,
    },
    Randn {
        mean: f64,
        stdev: f64,
    },
    Kaiming {
        #[serde(default)]
        distribution: Distribution,
        #[serde(default)]
        fan: Fan,
        #[serde(default = "default_nonlinearity")]
        nonlinearity: String,
        #[serde(default)]
        param: Option<f64>,
    },
}

impl InitConfig {
    pub fn build(&self) -> Result<Arc<dyn Initializer>> {
        let init: Arc<dyn Initializer> = match self {
            Self::Bilinear => Arc::new(Bilinear),
            Self::Array { shape, values } => {
                Arc::new(ArrayInit::new(values.clone(), shape.as_slice())?)
            }
            Self::Const { value } => Arc::new(Init::Const(*value)),
            Self::Uniform { lo, up } => Arc::new(Init::Uniform { lo: *lo, up: *up }),
            Self::Randn { mean, stdev } => Arc::new(Init::Randn {
                mean: *mean,
                stdev: *stdev,
            }),
            Self::Kaiming {
                distribution,
                fan,
                nonlinearity,
                param,
            } => {
                let dist = match distribution {
                    Distribution::Normal => NormalOrUniform::Normal,
                    Distribution::Uniform => NormalOrUniform::Uniform,
                };
                let fan = match fan {
                    Fan::FanIn => FanInOut::FanIn,
                    Fan::FanOut => FanInOut::FanOut,
                };
                let non_linearity = NonLinearity::from_name(nonlinearity, *param)?;
                Arc::new(Init::Kaiming {
                    dist,
                    fan,
                    non_linearity,
                })
            }
        };
        Ok(init)
    }
}

/// Default weight and bias initializers, `null` or a missing entry means no default.
#[derive(Debug, Clone, Default, PartialEq, serde::Deserialize, serde::Serialize)]
#[serde(deny_unknown_fields)]
pub struct DefaultsConfig {
    #[serde(default)]
    pub weight: Option<InitConfig>,
    #[serde(default)]
    pub bias: Option<InitConfig>,
}

impl DefaultsConfig {
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json).map_err(|e| Error::InvalidArgument {
            name: "defaults",
            msg: e.to_string(),
        })
    }
}
