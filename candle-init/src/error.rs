use candle::{DType, Shape};

/// Errors raised while building or applying an initializer.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("{init}: invalid shape {shape:?}, {msg}")]
    InvalidShape {
        init: &'static str,
        shape: Shape,
        msg: &'static str,
    },

    #[error("{init}: unsupported dtype {dtype:?} (computed as {compute:?})")]
    UnsupportedDType {
        init: &'static str,
        dtype: DType,
        compute: DType,
    },

    #[error("{init}: {elem_count} elements exceeds the limit of {limit}")]
    SizeLimit {
        init: &'static str,
        elem_count: usize,
        limit: usize,
    },

    #[error("invalid argument {name}: {msg}")]
    InvalidArgument { name: &'static str, msg: String },

    #[error("nonlinearity function {0} is not supported")]
    UnsupportedNonLinearity(String),

    #[error(transparent)]
    Candle(#[from] candle::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
