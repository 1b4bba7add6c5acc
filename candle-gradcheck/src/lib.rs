//! Numeric gradient checks for [candle](https://github.com/huggingface/candle) operators.
//!
//! An operator implements [`DifferentiableOp`], its analytic gradient defaulting to candle's
//! autograd. [`GradCheckSpec`] compares that gradient against central differences, at order 1
//! or on the double and triple gradients built with [`compose_with_gradient_seed`].
//!
//! ```rust
//! use candle::{Device, Tensor};
//! use candle_gradcheck::{double_grad_check, Elementwise, GradCheckConfig};
//! # fn main() -> candle_gradcheck::Result<()> {
//! let x = Tensor::new(&[[0.5f64, -0.3], [0.1, 0.9]], &Device::Cpu)?;
//! let y = Tensor::new(&[[-0.2f64, 0.4], [0.7, -0.6]], &Device::Cpu)?;
//! let config = GradCheckConfig { eps: 5e-3, atol: 1e-2, ..Default::default() };
//! let report = double_grad_check(Elementwise::mul(), &[x, y], &config)?;
//! assert!(report.passed);
//! # Ok(()) }
//! ```
mod check;
mod compose;
pub mod elementwise;
mod error;
mod func;
pub mod graph;
mod op;
pub mod test_utils;

pub use check::{
    double_grad_check, grad_check, triple_grad_check, GradCheckConfig, GradCheckReport,
    GradCheckSpec,
};
pub use compose::{compose_with_gradient_seed, Composed, GradOf};
pub use elementwise::{BinaryOp, Elementwise};
pub use error::{Error, Mismatch, Result};
pub use func::{func_op, FnOp};
pub use graph::{Program, ProgramBuilder};
pub use op::{backprop, keep_grad_graph, DifferentiableOp};
