//! Parameter initializers for candle.
//!
//! Initializers compute the values a parameter starts with: a bilinear upsampling kernel, a
//! copy of a dense array, or constant and random fills. The values are then written to a tensor
//! by a [`TensorMaterializer`], either immediately or through a recorded [`InitProgram`].
//!
//! ```rust
//! use candle::{DType, Device};
//! use candle_init::{tensor, Bilinear};
//! # fn main() -> candle_init::Result<()> {
//! let w = tensor(&Bilinear, (1, 1, 2, 2), DType::F32, &Device::Cpu)?;
//! assert_eq!(w.flatten_all()?.to_vec1::<f32>()?, [0.25, 0.25, 0.25, 0.25]);
//! # Ok(()) }
//! ```
pub mod array;
pub mod bilinear;
mod buffer;
pub mod config;
pub mod defaults;
mod error;
pub mod gain;
pub mod init;
pub mod materialize;
pub mod promote;

pub use array::ArrayInit;
pub use bilinear::Bilinear;
pub use buffer::{TensorDesc, ValueBuffer, Values};
pub use config::{DefaultsConfig, InitConfig};
pub use defaults::InitDefaults;
pub use error::{Error, Result};
pub use gain::{calculate_gain, NonLinearity};
pub use init::{Init, Initializer};
pub use materialize::{init_tensor, tensor, var, Eager, InitProgram, TensorMaterializer};
