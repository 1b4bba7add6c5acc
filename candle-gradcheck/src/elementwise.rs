//! Elementwise arithmetic between two tensors.
use crate::{DifferentiableOp, Error, Result};
use candle::Tensor;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
}

impl BinaryOp {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Add => "add",
            Self::Sub => "sub",
            Self::Mul => "mul",
            Self::Div => "div",
        }
    }

    /// Applies the operation with broadcasting.
    ///
    /// Without `axis` the usual right-aligned broadcasting rules apply. With `axis` the
    /// dimensions of `rhs` are matched with the dimensions of `lhs` starting at `axis`, e.g. a
    /// `(2, 3)` rhs with `axis = 0` is combined with a `(2, 3, 4)` lhs as if it were `(2, 3, 1)`.
    pub fn apply(&self, lhs: &Tensor, rhs: &Tensor, axis: Option<usize>) -> Result<Tensor> {
        let rhs = match axis {
            None => rhs.clone(),
            Some(axis) => align(lhs, rhs, axis)?,
        };
        let res = match self {
            Self::Add => lhs.broadcast_add(&rhs)?,
            Self::Sub => lhs.broadcast_sub(&rhs)?,
            Self::Mul => lhs.broadcast_mul(&rhs)?,
            Self::Div => lhs.broadcast_div(&rhs)?,
        };
        Ok(res)
    }
}

fn align(lhs: &Tensor, rhs: &Tensor, axis: usize) -> Result<Tensor> {
    let (l_dims, r_dims) = (lhs.dims(), rhs.dims());
    let fits = axis + r_dims.len() <= l_dims.len()
        && r_dims
            .iter()
            .zip(l_dims[axis..].iter())
            .all(|(&r, &l)| r == l || r == 1);
    if !fits {
        Err(Error::InvalidArgument {
            name: "axis",
            msg: format!("cannot align {r_dims:?} with {l_dims:?} at axis {axis}"),
        })?
    }
    let mut dims = vec![1; l_dims.len()];
    dims[axis..axis + r_dims.len()].copy_from_slice(r_dims);
    Ok(rhs.reshape(dims)?)
}

/// A binary elementwise operator, `forward` takes exactly two inputs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Elementwise {
    op: BinaryOp,
    axis: Option<usize>,
}

impl Elementwise {
    pub fn new(op: BinaryOp) -> Self {
        Self { op, axis: None }
    }

    pub fn add() -> Self {
        Self::new(BinaryOp::Add)
    }

    pub fn sub() -> Self {
        Self::new(BinaryOp::Sub)
    }

    pub fn mul() -> Self {
        Self::new(BinaryOp::Mul)
    }

    pub fn div() -> Self {
        Self::new(BinaryOp::Div)
    }

    /// Aligns the second input with the first one starting at `axis`.
    pub fn with_axis(mut self, axis: usize) -> Self {
        self.axis = Some(axis);
        self
    }
}

impl DifferentiableOp for Elementwise {
    fn name(&self) -> String {
        match self.axis {
            None => self.op.name().to_string(),
            Some(axis) => format!("{}_with_axis{axis}", self.op.name()),
        }
    }

    fn forward(&self, xs: &[Tensor]) -> Result<Vec<Tensor>> {
        match xs {
            [lhs, rhs] => Ok(vec![self.op.apply(lhs, rhs, self.axis)?]),
            _ => Err(Error::InvalidArgument {
                name: "inputs",
                msg: format!("{} expects 2 inputs, got {}", self.name(), xs.len()),
            }),
        }
    }
}
