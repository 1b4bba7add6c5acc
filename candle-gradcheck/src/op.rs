//! Operators whose gradients can be checked.
use crate::{Error, Result};
use candle::{Tensor, Var};
use std::sync::Once;

static KEEP_GRAD_GRAPH: Once = Once::new();

/// Keeps the backward graph attached to the gradients computed by candle so that gradients can
/// be differentiated again.
///
/// candle reads this setting once per thread, on the first backward pass run by that thread, so
/// it has no effect on threads that already ran a backward pass. Every backward pass run by this
/// crate calls it first, and higher order checks run on a fresh thread for that reason.
pub fn keep_grad_graph() {
    KEEP_GRAD_GRAPH.call_once(|| {
        tracing::debug!("enabling CANDLE_GRAD_DO_NOT_DETACH for higher order gradients");
        std::env::set_var("CANDLE_GRAD_DO_NOT_DETACH", "1")
    });
}

/// A function of several tensors with an analytic gradient.
pub trait DifferentiableOp: Send + Sync {
    fn name(&self) -> String;

    /// Evaluates the operator on concrete inputs.
    fn forward(&self, xs: &[Tensor]) -> Result<Vec<Tensor>>;

    /// The vector-jacobian product: given one upstream gradient per output, returns the gradient
    /// of `sum(outputs[k] * seeds[k])` with respect to each input.
    ///
    /// The default implementation differentiates `forward` with candle's autograd, the returned
    /// gradients stay attached to the graph of the inputs that are variables.
    fn gradient(&self, xs: &[Tensor], seeds: &[Tensor]) -> Result<Vec<Tensor>> {
        backprop(self, xs, seeds)
    }
}

/// Computes the gradient of `op` by running a backward pass through its forward graph.
///
/// Inputs that are already variables are used as is, so that the result can be differentiated
/// with respect to them. Inputs the outputs do not depend on get a zero gradient.
pub fn backprop<O: DifferentiableOp + ?Sized>(
    op: &O,
    xs: &[Tensor],
    seeds: &[Tensor],
) -> Result<Vec<Tensor>> {
    keep_grad_graph();
    let xs = xs
        .iter()
        .map(|x| Ok(Var::from_tensor(x)?.into_inner()))
        .collect::<Result<Vec<_>>>()?;
    let ys = op.forward(&xs)?;
    if ys.len() != seeds.len() {
        Err(Error::InvalidArgument {
            name: "seeds",
            msg: format!(
                "{} has {} outputs but {} seeds were given",
                op.name(),
                ys.len(),
                seeds.len()
            ),
        })?
    }
    let mut loss: Option<Tensor> = None;
    for (y, seed) in ys.iter().zip(seeds.iter()) {
        if y.shape() != seed.shape() {
            Err(Error::InvalidArgument {
                name: "seeds",
                msg: format!(
                    "seed shape {:?} does not match output shape {:?}",
                    seed.shape(),
                    y.shape()
                ),
            })?
        }
        let term = y.mul(seed)?.sum_all()?;
        loss = Some(match loss {
            None => term,
            Some(loss) => (loss + term)?,
        });
    }
    let grads = match loss {
        Some(loss) => Some(loss.backward()?),
        None => None,
    };
    let grads = xs
        .iter()
        .map(|x| match grads.as_ref().and_then(|g| g.get(x)) {
            Some(g) => Ok(g.clone()),
            None => x.zeros_like(),
        })
        .collect::<candle::Result<Vec<_>>>()?;
    Ok(grads)
}
