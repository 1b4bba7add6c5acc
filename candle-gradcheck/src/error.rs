/// Where the largest discrepancy between the analytic and numeric jacobians was found.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Mismatch {
    /// Index of the perturbed input.
    pub input: usize,
    /// Flat index of the perturbed element within that input.
    pub element: usize,
    /// Flat index of the output element, outputs being concatenated.
    pub output: usize,
    pub analytic: f64,
    pub numeric: f64,
}

impl std::fmt::Display for Mismatch {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "d(output[{}])/d(input {}[{}]): analytic {}, numeric {}",
            self.output, self.input, self.element, self.analytic, self.numeric
        )
    }
}

/// Gradient check errors.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("{op}: gradient check of order {order} failed, max error {max_error} at {at}")]
    ToleranceExceeded {
        op: String,
        order: usize,
        max_error: f64,
        at: Mismatch,
    },

    #[error("invalid argument {name}: {msg}")]
    InvalidArgument { name: &'static str, msg: String },

    #[error(transparent)]
    Candle(#[from] candle::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
