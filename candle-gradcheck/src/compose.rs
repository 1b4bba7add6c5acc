//! Higher order derivatives through operator composition.
use crate::{DifferentiableOp, Error, Result};
use candle::Tensor;
use std::sync::Arc;

/// The gradient of an operator, seen as an operator itself.
///
/// The inputs are the inputs of the inner operator followed by one seed per inner output, the
/// outputs are the gradients of the inner operator with respect to its inputs.
///
/// Differentiating the outputs again only works on threads where candle keeps the backward
/// graph, see [`crate::keep_grad_graph`]. [`crate::GradCheckSpec`] takes care of this.
#[derive(Clone)]
pub struct GradOf<'a> {
    inner: Arc<dyn DifferentiableOp + 'a>,
    num_inputs: usize,
}

impl<'a> GradOf<'a> {
    pub fn new(inner: Arc<dyn DifferentiableOp + 'a>, num_inputs: usize) -> Self {
        Self { inner, num_inputs }
    }
}

impl std::fmt::Debug for GradOf<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl DifferentiableOp for GradOf<'_> {
    fn name(&self) -> String {
        format!("grad({})", self.inner.name())
    }

    fn forward(&self, xs: &[Tensor]) -> Result<Vec<Tensor>> {
        if xs.len() < self.num_inputs {
            Err(Error::InvalidArgument {
                name: "inputs",
                msg: format!(
                    "{} expects {} inputs followed by seeds, got {}",
                    self.name(),
                    self.num_inputs,
                    xs.len()
                ),
            })?
        }
        let (inputs, seeds) = xs.split_at(self.num_inputs);
        self.inner.gradient(inputs, seeds)
    }
}

/// An operator together with the inputs it has to be checked on.
#[derive(Clone)]
pub struct Composed<'a> {
    pub op: Arc<dyn DifferentiableOp + 'a>,
    pub inputs: Vec<Tensor>,
}

/// Wraps `op` into its gradient `order - 1` times.
///
/// Every wrapping appends one seed per output of the current operator to the inputs. The seeds
/// for the `i`-th wrapping are taken from `seeds[i]` when provided and are ones otherwise. An
/// `order` of 1 returns `op` and `inputs` unchanged.
pub fn compose_with_gradient_seed<'a>(
    op: Arc<dyn DifferentiableOp + 'a>,
    order: usize,
    inputs: &[Tensor],
    seeds: &[Vec<Tensor>],
) -> Result<Composed<'a>> {
    if order == 0 {
        Err(Error::InvalidArgument {
            name: "order",
            msg: "the derivative order has to be at least 1".to_string(),
        })?
    }
    if seeds.len() >= order {
        Err(Error::InvalidArgument {
            name: "seeds",
            msg: format!("{} seed sets given for order {order}", seeds.len()),
        })?
    }
    let mut op = op;
    let mut xs = inputs.to_vec();
    for level in 0..order - 1 {
        let ys = op.forward(&xs)?;
        let level_seeds = match seeds.get(level) {
            Some(seeds) => {
                let matches = seeds.len() == ys.len()
                    && seeds.iter().zip(ys.iter()).all(|(s, y)| {
                        s.shape() == y.shape() && s.dtype() == y.dtype()
                    });
                if !matches {
                    Err(Error::InvalidArgument {
                        name: "seeds",
                        msg: format!(
                            "seeds for level {level} do not match the outputs of {}",
                            op.name()
                        ),
                    })?
                }
                seeds.clone()
            }
            None => ys
                .iter()
                .map(|y| y.ones_like())
                .collect::<candle::Result<Vec<_>>>()?,
        };
        op = Arc::new(GradOf::new(op, xs.len()));
        xs.extend(level_seeds);
    }
    Ok(Composed { op, inputs: xs })
}
