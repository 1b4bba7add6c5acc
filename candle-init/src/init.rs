//! Variable initialization.
// This is based on:
// https://github.com/pytorch/pytorch/blob/07107919297db3f8ab37f11c12666b6d6d5f692e/torch/nn/init.py#
use crate::promote::PromotionRule;
use crate::{Error, NonLinearity, Result, TensorDesc, ValueBuffer, Values};
use candle::{DType, Shape};
use rand::Rng;
use rand_distr::Distribution;

/// Produces the values a freshly created tensor starts with.
///
/// The returned buffer holds the values in the dtype the initializer computes in. When it
/// differs from the requested dtype the caller is expected to cast the materialized tensor, see
/// [`crate::init_tensor`].
pub trait Initializer: std::fmt::Debug + Send + Sync {
    // Box<dyn> does not support const yet, so use a function to get the name.
    fn name(&self) -> &'static str;

    fn initialize(&self, desc: &TensorDesc) -> Result<ValueBuffer>;
}

/// Number of features as input or output of a layer.
/// In Kaiming initialization, choosing `FanIn` preserves
/// the magnitude of the variance of the weights in the
/// forward pass, choosing `FanOut` preserves this
/// magnitude in the backward pass.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum FanInOut {
    FanIn,
    FanOut,
}

impl FanInOut {
    /// Compute the fan-in or fan-out value for a weight tensor of
    /// the specified dimensions.
    /// <https://github.com/pytorch/pytorch/blob/dbeacf11820e336e803bb719b7aaaf2125ae4d9c/torch/nn/init.py#L284>
    pub fn for_shape(&self, shape: &Shape) -> usize {
        let dims = shape.dims();
        let receptive_field_size: usize = dims.iter().skip(2).product();
        match &self {
            FanInOut::FanIn => {
                if dims.len() < 2 {
                    1
                } else {
                    dims[1] * receptive_field_size
                }
            }
            FanInOut::FanOut => {
                if dims.is_empty() {
                    1
                } else {
                    dims[0] * receptive_field_size
                }
            }
        }
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum NormalOrUniform {
    Normal,
    Uniform,
}

/// Constant and random initializations.
#[derive(Debug, Copy, Clone, PartialEq)]
pub enum Init {
    /// Constant value.
    Const(f64),

    /// Random normal with some mean and standard deviation.
    Randn { mean: f64, stdev: f64 },

    /// Uniform initialization between some lower and upper bounds.
    Uniform { lo: f64, up: f64 },

    /// Kaiming uniform initialization.
    /// See "Delving deep into rectifiers: Surpassing human-level performance on ImageNet classification"
    /// He, K. et al. (2015). This uses a uniform distribution.
    Kaiming {
        dist: NormalOrUniform,
        fan: FanInOut,
        non_linearity: NonLinearity,
    },
}

pub const ZERO: Init = Init::Const(0.);
pub const ONE: Init = Init::Const(1.);

pub const DEFAULT_KAIMING_UNIFORM: Init = Init::Kaiming {
    dist: NormalOrUniform::Uniform,
    fan: FanInOut::FanIn,
    non_linearity: NonLinearity::ReLU,
};

pub const DEFAULT_KAIMING_NORMAL: Init = Init::Kaiming {
    dist: NormalOrUniform::Normal,
    fan: FanInOut::FanIn,
    non_linearity: NonLinearity::ReLU,
};

impl Default for Init {
    fn default() -> Self {
        Self::Const(0.)
    }
}

fn uniform(lo: f64, up: f64, n: usize) -> Result<Vec<f64>> {
    if !(lo.is_finite() && up.is_finite() && lo < up) {
        Err(Error::InvalidArgument {
            name: "uniform",
            msg: format!("expected finite bounds with {lo} < {up}"),
        })?
    }
    let mut rng = rand::thread_rng();
    Ok((0..n).map(|_| rng.gen_range(lo..up)).collect())
}

fn randn(mean: f64, stdev: f64, n: usize) -> Result<Vec<f64>> {
    let normal = rand_distr::Normal::new(mean, stdev).map_err(|e| Error::InvalidArgument {
        name: "randn",
        msg: e.to_string(),
    })?;
    let mut rng = rand::thread_rng();
    Ok((0..n).map(|_| normal.sample(&mut rng)).collect())
}

impl Init {
    fn sample(&self, shape: &Shape) -> Result<Vec<f64>> {
        let n = shape.elem_count();
        match *self {
            Self::Const(cst) => Ok(vec![cst; n]),
            Self::Uniform { lo, up } => uniform(lo, up, n),
            Self::Randn { mean, stdev } => randn(mean, stdev, n),
            Self::Kaiming {
                dist,
                fan,
                non_linearity,
            } => {
                let fan = fan.for_shape(shape);
                if fan == 0 {
                    Err(Error::InvalidShape {
                        init: "kaiming",
                        shape: shape.clone(),
                        msg: "fan is zero",
                    })?
                }
                let std = non_linearity.gain() / (fan as f64).sqrt();
                match dist {
                    NormalOrUniform::Uniform => {
                        let bound = 3f64.sqrt() * std;
                        uniform(-bound, bound, n)
                    }
                    NormalOrUniform::Normal => randn(0., std, n),
                }
            }
        }
    }
}

impl Initializer for Init {
    fn name(&self) -> &'static str {
        match self {
            Self::Const(_) => "const",
            Self::Randn { .. } => "randn",
            Self::Uniform { .. } => "uniform",
            Self::Kaiming { .. } => "kaiming",
        }
    }

    fn initialize(&self, desc: &TensorDesc) -> Result<ValueBuffer> {
        let promotion = PromotionRule::Half.promote(desc.dtype());
        let values = self.sample(desc.shape())?;
        let values = match promotion.compute {
            DType::F32 => Values::F32(values.into_iter().map(|v| v as f32).collect()),
            DType::F64 => Values::F64(values),
            compute => Err(Error::UnsupportedDType {
                init: self.name(),
                dtype: desc.dtype(),
                compute,
            })?,
        };
        ValueBuffer::new(desc.shape().clone(), values)
    }
}
