//! Numeric verification of analytic gradients.
//!
//! The jacobian of an operator is estimated with central differences, perturbing every input
//! element in turn, and compared with the jacobian obtained by back-propagating one-hot seeds
//! through the operator. Higher orders check the gradient operator built by
//! [`compose_with_gradient_seed`].
use crate::compose::compose_with_gradient_seed;
use crate::{keep_grad_graph, DifferentiableOp, Error, Mismatch, Result};
use candle::{DType, Tensor};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Finite-difference step and tolerances, an analytic value `a` matches a numeric estimate `n`
/// when `|a - n| <= atol + rtol * |n|`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct GradCheckConfig {
    pub eps: f64,
    pub atol: f64,
    pub rtol: f64,
}

impl Default for GradCheckConfig {
    fn default() -> Self {
        Self {
            eps: 1e-6,
            atol: 1e-5,
            rtol: 1e-3,
        }
    }
}

impl GradCheckConfig {
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json).map_err(|e| Error::InvalidArgument {
            name: "config",
            msg: e.to_string(),
        })
    }

    fn validate(&self) -> Result<()> {
        if !(self.eps.is_finite() && self.eps > 0.) {
            Err(Error::InvalidArgument {
                name: "eps",
                msg: format!("the step has to be positive, got {}", self.eps),
            })?
        }
        if !(self.atol >= 0. && self.rtol >= 0.) {
            Err(Error::InvalidArgument {
                name: "tolerance",
                msg: format!("negative tolerance atol={} rtol={}", self.atol, self.rtol),
            })?
        }
        Ok(())
    }

    fn within(&self, analytic: f64, numeric: f64) -> bool {
        (analytic - numeric).abs() <= self.atol + self.rtol * numeric.abs()
    }
}

/// Outcome of a gradient check.
#[derive(Debug, Clone, PartialEq)]
pub struct GradCheckReport {
    pub op: String,
    pub order: usize,
    pub passed: bool,
    /// Largest absolute difference between the two jacobians.
    pub max_error: f64,
    /// The worst failing entry, or the entry with the largest difference when all entries are
    /// within tolerance. `None` when the jacobian is empty.
    pub worst: Option<Mismatch>,
    /// Number of compared jacobian entries.
    pub checked: usize,
    pub failures: usize,
}

struct Jacobians {
    name: String,
    offsets: Vec<usize>,
    numeric: Vec<Vec<f64>>,
    analytic: Vec<Vec<f64>>,
}

/// An operator, the point where its gradient is checked, and how.
#[derive(Clone)]
pub struct GradCheckSpec<'a> {
    pub op: Arc<dyn DifferentiableOp + 'a>,
    pub inputs: Vec<Tensor>,
    /// 1 checks the operator gradient, 2 its double gradient, 3 its triple gradient.
    pub order: usize,
    /// Upstream gradients used when composing higher orders, one set per extra order. Missing
    /// sets default to ones.
    pub seeds: Vec<Vec<Tensor>>,
    pub config: GradCheckConfig,
}

impl<'a> GradCheckSpec<'a> {
    pub fn new<O: DifferentiableOp + 'a>(op: O, inputs: &[Tensor]) -> Self {
        Self::from_arc(Arc::new(op), inputs)
    }

    pub fn from_arc(op: Arc<dyn DifferentiableOp + 'a>, inputs: &[Tensor]) -> Self {
        Self {
            op,
            inputs: inputs.to_vec(),
            order: 1,
            seeds: vec![],
            config: GradCheckConfig::default(),
        }
    }

    pub fn with_order(mut self, order: usize) -> Self {
        self.order = order;
        self
    }

    pub fn with_seeds(mut self, seeds: Vec<Vec<Tensor>>) -> Self {
        self.seeds = seeds;
        self
    }

    pub fn with_config(mut self, config: GradCheckConfig) -> Self {
        self.config = config;
        self
    }

    /// Runs the check and reports the outcome, a mismatch is not an error here.
    pub fn run(&self) -> Result<GradCheckReport> {
        let span = tracing::span!(
            tracing::Level::TRACE,
            "grad_check",
            op = %self.op.name(),
            order = self.order
        );
        let _enter = span.enter();
        self.config.validate()?;
        for (index, x) in self.inputs.iter().enumerate() {
            if !x.dtype().is_float() {
                Err(Error::InvalidArgument {
                    name: "inputs",
                    msg: format!("input {index} has non float dtype {:?}", x.dtype()),
                })?
            }
        }
        let jacobians = if self.order > 1 {
            // A thread that already ran a backward pass keeps detaching gradients, so the
            // nested backward passes run on a thread of their own.
            std::thread::scope(|s| {
                let worker = s.spawn(|| {
                    let _enter = span.enter();
                    keep_grad_graph();
                    self.jacobians()
                });
                match worker.join() {
                    Ok(jacobians) => jacobians,
                    Err(panic) => std::panic::resume_unwind(panic),
                }
            })?
        } else {
            self.jacobians()?
        };
        let Jacobians {
            name,
            offsets,
            numeric,
            analytic,
        } = jacobians;

        let mut report = GradCheckReport {
            op: name,
            order: self.order,
            passed: true,
            max_error: 0.,
            worst: None,
            checked: 0,
            failures: 0,
        };
        let mut worst_any: Option<(f64, Mismatch)> = None;
        let mut worst_failing: Option<(f64, Mismatch)> = None;
        for (row, (a_row, n_row)) in analytic.iter().zip(numeric.iter()).enumerate() {
            for (output, (&a, &n)) in a_row.iter().zip(n_row.iter()).enumerate() {
                let error = (a - n).abs();
                report.checked += 1;
                report.max_error = report.max_error.max(error);
                let (input, element) = locate(&offsets, row);
                let at = Mismatch {
                    input,
                    element,
                    output,
                    analytic: a,
                    numeric: n,
                };
                let slot = if self.config.within(a, n) {
                    &mut worst_any
                } else {
                    report.failures += 1;
                    &mut worst_failing
                };
                if slot.map_or(true, |(e, _)| error > e) {
                    *slot = Some((error, at))
                }
            }
        }
        report.passed = report.failures == 0;
        report.worst = worst_failing.or(worst_any).map(|(_, at)| at);
        if report.passed {
            tracing::debug!(
                op = %report.op,
                order = report.order,
                checked = report.checked,
                max_error = report.max_error,
                "gradient check passed"
            );
        } else if let Some(worst) = report.worst {
            tracing::warn!(
                op = %report.op,
                order = report.order,
                failures = report.failures,
                max_error = report.max_error,
                "gradient check failed, {worst}"
            );
        }
        Ok(report)
    }

    fn jacobians(&self) -> Result<Jacobians> {
        let composed =
            compose_with_gradient_seed(self.op.clone(), self.order, &self.inputs, &self.seeds)?;
        let op = composed.op.as_ref();
        let xs = composed.inputs;
        Ok(Jacobians {
            name: op.name(),
            offsets: input_offsets(&xs),
            numeric: numeric_jacobian(op, &xs, self.config.eps)?,
            analytic: analytic_jacobian(op, &xs)?,
        })
    }

    /// Same as [`Self::run`] but a mismatch is returned as [`Error::ToleranceExceeded`].
    pub fn check(&self) -> Result<GradCheckReport> {
        let report = self.run()?;
        match report.worst {
            Some(at) if !report.passed => Err(Error::ToleranceExceeded {
                op: report.op,
                order: report.order,
                max_error: report.max_error,
                at,
            }),
            _ => Ok(report),
        }
    }
}

/// Checks the gradient of `op` at `inputs`.
pub fn grad_check<'a, O: DifferentiableOp + 'a>(
    op: O,
    inputs: &[Tensor],
    config: &GradCheckConfig,
) -> Result<GradCheckReport> {
    GradCheckSpec::new(op, inputs)
        .with_config(*config)
        .check()
}

/// Checks the gradient of the gradient of `op`, the upstream gradient being ones.
pub fn double_grad_check<'a, O: DifferentiableOp + 'a>(
    op: O,
    inputs: &[Tensor],
    config: &GradCheckConfig,
) -> Result<GradCheckReport> {
    GradCheckSpec::new(op, inputs)
        .with_order(2)
        .with_config(*config)
        .check()
}

/// Checks the third order gradient of `op`, both upstream gradients being ones.
pub fn triple_grad_check<'a, O: DifferentiableOp + 'a>(
    op: O,
    inputs: &[Tensor],
    config: &GradCheckConfig,
) -> Result<GradCheckReport> {
    GradCheckSpec::new(op, inputs)
        .with_order(3)
        .with_config(*config)
        .check()
}

fn to_f64_vec(t: &Tensor) -> Result<Vec<f64>> {
    Ok(t.flatten_all()?.to_dtype(DType::F64)?.to_vec1::<f64>()?)
}

fn flat_outputs(ys: &[Tensor]) -> Result<Vec<f64>> {
    let mut out = vec![];
    for y in ys.iter() {
        out.extend(to_f64_vec(y)?)
    }
    Ok(out)
}

fn input_offsets(xs: &[Tensor]) -> Vec<usize> {
    let mut offsets = Vec::with_capacity(xs.len() + 1);
    let mut offset = 0;
    offsets.push(offset);
    for x in xs.iter() {
        offset += x.elem_count();
        offsets.push(offset)
    }
    offsets
}

fn locate(offsets: &[usize], row: usize) -> (usize, usize) {
    let input = offsets.partition_point(|&o| o <= row).saturating_sub(1);
    (input, row - offsets[input])
}

/// Rows are indexed by input elements, inputs being concatenated, columns by output elements.
fn numeric_jacobian(op: &dyn DifferentiableOp, xs: &[Tensor], eps: f64) -> Result<Vec<Vec<f64>>> {
    let mut jacobian = vec![];
    for (index, x) in xs.iter().enumerate() {
        let values = to_f64_vec(x)?;
        for element in 0..values.len() {
            let eval = |delta: f64| -> Result<Vec<f64>> {
                let mut perturbed = values.clone();
                perturbed[element] += delta;
                let perturbed =
                    Tensor::from_vec(perturbed, x.shape(), x.device())?.to_dtype(x.dtype())?;
                let mut inputs = xs.to_vec();
                inputs[index] = perturbed;
                flat_outputs(&op.forward(&inputs)?)
            };
            let plus = eval(eps)?;
            let minus = eval(-eps)?;
            let row = plus
                .iter()
                .zip(minus.iter())
                .map(|(p, m)| (p - m) / (2. * eps))
                .collect();
            jacobian.push(row)
        }
    }
    Ok(jacobian)
}

/// Same layout as [`numeric_jacobian`], built one column at a time by back-propagating a
/// one-hot seed.
fn analytic_jacobian(op: &dyn DifferentiableOp, xs: &[Tensor]) -> Result<Vec<Vec<f64>>> {
    let ys = op.forward(xs)?;
    let num_rows: usize = xs.iter().map(|x| x.elem_count()).sum();
    let num_cols: usize = ys.iter().map(|y| y.elem_count()).sum();
    let mut jacobian = vec![vec![0f64; num_cols]; num_rows];
    let mut col = 0;
    for (k, y) in ys.iter().enumerate() {
        for element in 0..y.elem_count() {
            let seeds = ys
                .iter()
                .enumerate()
                .map(|(j, yj)| {
                    if j == k {
                        let mut one_hot = vec![0f64; yj.elem_count()];
                        one_hot[element] = 1.;
                        Tensor::from_vec(one_hot, yj.shape(), yj.device())?.to_dtype(yj.dtype())
                    } else {
                        yj.zeros_like()
                    }
                })
                .collect::<candle::Result<Vec<_>>>()?;
            let grads = op.gradient(xs, &seeds)?;
            if grads.len() != xs.len() {
                Err(Error::InvalidArgument {
                    name: "gradient",
                    msg: format!(
                        "{} returned {} gradients for {} inputs",
                        op.name(),
                        grads.len(),
                        xs.len()
                    ),
                })?
            }
            let mut row = 0;
            for (x, g) in xs.iter().zip(grads.iter()) {
                if g.elem_count() != x.elem_count() {
                    Err(Error::InvalidArgument {
                        name: "gradient",
                        msg: format!(
                            "{} returned a gradient of shape {:?} for an input of shape {:?}",
                            op.name(),
                            g.shape(),
                            x.shape()
                        ),
                    })?
                }
                for v in to_f64_vec(g)? {
                    jacobian[row][col] = v;
                    row += 1;
                }
            }
            col += 1;
        }
    }
    Ok(jacobian)
}
