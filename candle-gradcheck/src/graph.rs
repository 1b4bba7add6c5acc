//! Operators described as a graph that is built once and then executed on bound inputs.
//!
//! ```rust
//! use candle::{Device, Tensor};
//! use candle_gradcheck::{DifferentiableOp, ProgramBuilder};
//! # fn main() -> candle_gradcheck::Result<()> {
//! let mut b = ProgramBuilder::new("x*y-x");
//! let x = b.input();
//! let y = b.input();
//! let xy = b.mul(x, y);
//! let out = b.sub(xy, x);
//! let program = b.build(&[out])?;
//!
//! let x = Tensor::new(&[1f64, 2.], &Device::Cpu)?;
//! let y = Tensor::new(&[3f64, 4.], &Device::Cpu)?;
//! let ys = program.forward(&[x, y])?;
//! assert_eq!(ys[0].to_vec1::<f64>()?, [2., 6.]);
//! # Ok(()) }
//! ```
use crate::elementwise::BinaryOp;
use crate::{DifferentiableOp, Error, Result};
use candle::Tensor;
use std::sync::atomic::{AtomicUsize, Ordering};

/// A node of the builder that created it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeId {
    builder: usize,
    index: usize,
}

fn next_builder_id() -> usize {
    static COUNTER: AtomicUsize = AtomicUsize::new(1);
    COUNTER.fetch_add(1, Ordering::Relaxed)
}

#[derive(Debug, Clone, PartialEq)]
enum Node {
    Input(usize),
    Binary {
        op: BinaryOp,
        lhs: NodeId,
        rhs: NodeId,
        axis: Option<usize>,
    },
}

/// Records the nodes of a [`Program`]. Nodes can only refer to previously created nodes so the
/// recorded order is a valid evaluation order.
#[derive(Debug, Clone)]
pub struct ProgramBuilder {
    id: usize,
    name: String,
    nodes: Vec<Node>,
    num_inputs: usize,
}

impl ProgramBuilder {
    pub fn new(name: &str) -> Self {
        Self {
            id: next_builder_id(),
            name: name.to_string(),
            nodes: vec![],
            num_inputs: 0,
        }
    }

    fn push(&mut self, node: Node) -> NodeId {
        self.nodes.push(node);
        NodeId {
            builder: self.id,
            index: self.nodes.len() - 1,
        }
    }

    /// Declares the next input, inputs are bound in declaration order.
    pub fn input(&mut self) -> NodeId {
        let index = self.num_inputs;
        self.num_inputs += 1;
        self.push(Node::Input(index))
    }

    pub fn binary(&mut self, op: BinaryOp, lhs: NodeId, rhs: NodeId) -> NodeId {
        self.push(Node::Binary {
            op,
            lhs,
            rhs,
            axis: None,
        })
    }

    /// Same as [`Self::binary`] with `rhs` aligned on `lhs` starting at `axis`.
    pub fn binary_with_axis(
        &mut self,
        op: BinaryOp,
        lhs: NodeId,
        rhs: NodeId,
        axis: usize,
    ) -> NodeId {
        self.push(Node::Binary {
            op,
            lhs,
            rhs,
            axis: Some(axis),
        })
    }

    pub fn add(&mut self, lhs: NodeId, rhs: NodeId) -> NodeId {
        self.binary(BinaryOp::Add, lhs, rhs)
    }

    pub fn sub(&mut self, lhs: NodeId, rhs: NodeId) -> NodeId {
        self.binary(BinaryOp::Sub, lhs, rhs)
    }

    pub fn mul(&mut self, lhs: NodeId, rhs: NodeId) -> NodeId {
        self.binary(BinaryOp::Mul, lhs, rhs)
    }

    pub fn div(&mut self, lhs: NodeId, rhs: NodeId) -> NodeId {
        self.binary(BinaryOp::Div, lhs, rhs)
    }

    pub fn build(self, outputs: &[NodeId]) -> Result<Program> {
        if outputs.is_empty() {
            Err(Error::InvalidArgument {
                name: "outputs",
                msg: format!("{} has no outputs", self.name),
            })?
        }
        let len = self.nodes.len();
        let owned = |id: &NodeId, before: usize| id.builder == self.id && id.index < before;
        let dangling = self.nodes.iter().enumerate().any(|(i, node)| match node {
            Node::Input(_) => false,
            Node::Binary { lhs, rhs, .. } => !owned(lhs, i) || !owned(rhs, i),
        });
        if dangling || outputs.iter().any(|o| !owned(o, len)) {
            Err(Error::InvalidArgument {
                name: "nodes",
                msg: format!("{} refers to nodes from another builder", self.name),
            })?
        }
        tracing::debug!(
            program = %self.name,
            nodes = len,
            inputs = self.num_inputs,
            "built program"
        );
        Ok(Program {
            name: self.name,
            nodes: self.nodes,
            num_inputs: self.num_inputs,
            outputs: outputs.to_vec(),
        })
    }
}

/// An immutable graph of elementwise operations.
#[derive(Debug, Clone)]
pub struct Program {
    name: String,
    nodes: Vec<Node>,
    num_inputs: usize,
    outputs: Vec<NodeId>,
}

impl Program {
    pub fn num_inputs(&self) -> usize {
        self.num_inputs
    }

    pub fn num_outputs(&self) -> usize {
        self.outputs.len()
    }

    /// Executes the program with `xs` bound to its inputs.
    pub fn run(&self, xs: &[Tensor]) -> Result<Vec<Tensor>> {
        if xs.len() != self.num_inputs {
            Err(Error::InvalidArgument {
                name: "inputs",
                msg: format!(
                    "{} expects {} inputs, got {}",
                    self.name,
                    self.num_inputs,
                    xs.len()
                ),
            })?
        }
        let mut values: Vec<Tensor> = Vec::with_capacity(self.nodes.len());
        for node in self.nodes.iter() {
            let value = match node {
                Node::Input(index) => xs[*index].clone(),
                Node::Binary {
                    op,
                    lhs,
                    rhs,
                    axis,
                } => op.apply(&values[lhs.index], &values[rhs.index], *axis)?,
            };
            values.push(value)
        }
        Ok(self.outputs.iter().map(|o| values[o.index].clone()).collect())
    }
}

impl DifferentiableOp for Program {
    fn name(&self) -> String {
        self.name.clone()
    }

    fn forward(&self, xs: &[Tensor]) -> Result<Vec<Tensor>> {
        self.run(xs)
    }
}
