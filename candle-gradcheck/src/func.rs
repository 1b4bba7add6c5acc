//! Operators defined by closures, evaluated as soon as they are called.
use crate::{DifferentiableOp, Error, Result};
use candle::Tensor;
use std::sync::Arc;

/// An operator defined by a simple closure over its inputs.
#[derive(Clone)]
pub struct FnOp<'a> {
    name: String,
    arity: usize,
    #[allow(clippy::type_complexity)]
    f: Arc<dyn 'a + Fn(&[Tensor]) -> candle::Result<Tensor> + Send + Sync>,
}

impl std::fmt::Debug for FnOp<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "func {}/{}", self.name, self.arity)
    }
}

/// Wraps a closure taking `arity` inputs.
///
/// ```rust
/// use candle::{Device, Tensor};
/// use candle_gradcheck::{func_op, grad_check, GradCheckConfig};
/// # fn main() -> candle_gradcheck::Result<()> {
/// let op = func_op("x*y+x", 2, |xs| (&xs[0] * &xs[1])? + &xs[0]);
/// let x = Tensor::new(&[0.5f64, -0.25, 1.], &Device::Cpu)?;
/// let y = Tensor::new(&[2f64, 0.75, -1.], &Device::Cpu)?;
/// let report = grad_check(op, &[x, y], &GradCheckConfig::default())?;
/// assert!(report.passed);
/// # Ok(()) }
/// ```
pub fn func_op<'a, F>(name: &str, arity: usize, f: F) -> FnOp<'a>
where
    F: 'a + Fn(&[Tensor]) -> candle::Result<Tensor> + Send + Sync,
{
    FnOp {
        name: name.to_string(),
        arity,
        f: Arc::new(f),
    }
}

impl DifferentiableOp for FnOp<'_> {
    fn name(&self) -> String {
        self.name.clone()
    }

    fn forward(&self, xs: &[Tensor]) -> Result<Vec<Tensor>> {
        if xs.len() != self.arity {
            Err(Error::InvalidArgument {
                name: "inputs",
                msg: format!("{} expects {} inputs, got {}", self.name, self.arity, xs.len()),
            })?
        }
        Ok(vec![(*self.f)(xs)?])
    }
}
