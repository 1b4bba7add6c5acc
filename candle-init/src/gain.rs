//! Recommended gains for the non-linearity that follows a layer.
// This is based on:
// https://github.com/pytorch/pytorch/blob/07107919297db3f8ab37f11c12666b6d6d5f692e/torch/nn/init.py#L67
use crate::{Error, Result};

/// Slope used for `leaky_relu` when no parameter is given.
pub const DEFAULT_LEAKY_RELU_SLOPE: f64 = 0.01;

/// The non-linear function that follows this layer. ReLU is the
/// recommended value.
#[derive(Debug, Copy, Clone, PartialEq)]
pub enum NonLinearity {
    Sigmoid,
    Linear,
    Conv1d,
    Conv2d,
    Conv3d,
    ConvTranspose1d,
    ConvTranspose2d,
    ConvTranspose3d,
    Tanh,
    ReLU,
    /// Leaky ReLU with the given negative slope.
    LeakyReLU(f64),
    SELU,
    ExplicitGain(f64),
}

impl NonLinearity {
    pub fn gain(&self) -> f64 {
        match *self {
            NonLinearity::Sigmoid
            | NonLinearity::Linear
            | NonLinearity::Conv1d
            | NonLinearity::Conv2d
            | NonLinearity::Conv3d
            | NonLinearity::ConvTranspose1d
            | NonLinearity::ConvTranspose2d
            | NonLinearity::ConvTranspose3d => 1.,
            NonLinearity::Tanh => 5. / 3.,
            NonLinearity::ReLU => 2f64.sqrt(),
            NonLinearity::LeakyReLU(slope) => (2. / (1. + slope * slope)).sqrt(),
            NonLinearity::SELU => 0.75,
            NonLinearity::ExplicitGain(g) => g,
        }
    }

    /// Looks up a non-linearity by the name used in layer configurations, e.g. `relu` or
    /// `conv2d_transpose`. `param` is only used by `leaky_relu`.
    pub fn from_name(name: &str, param: Option<f64>) -> Result<Self> {
        let nl = match name {
            "sigmoid" => Self::Sigmoid,
            "linear" => Self::Linear,
            "conv1d" => Self::Conv1d,
            "conv2d" => Self::Conv2d,
            "conv3d" => Self::Conv3d,
            "conv1d_transpose" => Self::ConvTranspose1d,
            "conv2d_transpose" => Self::ConvTranspose2d,
            "conv3d_transpose" => Self::ConvTranspose3d,
            "tanh" => Self::Tanh,
            "relu" => Self::ReLU,
            "leaky_relu" => Self::LeakyReLU(param.unwrap_or(DEFAULT_LEAKY_RELU_SLOPE)),
            "selu" => Self::SELU,
            _ => return Err(Error::UnsupportedNonLinearity(name.to_string())),
        };
        Ok(nl)
    }
}

impl std::str::FromStr for NonLinearity {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::from_name(s, None)
    }
}

/// Returns the recommended gain for the named non-linearity.
///
/// ```rust
/// use candle_init::calculate_gain;
/// # fn main() -> candle_init::Result<()> {
/// assert_eq!(calculate_gain("tanh", None)?, 5. / 3.);
/// assert_eq!(calculate_gain("leaky_relu", Some(1.))?, 1.);
/// assert!(calculate_gain("swish", None).is_err());
/// # Ok(()) }
/// ```
pub fn calculate_gain(nonlinearity: &str, param: Option<f64>) -> Result<f64> {
    Ok(NonLinearity::from_name(nonlinearity, param)?.gain())
}
