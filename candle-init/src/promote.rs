//! Compute dtype selection for initializers.
//!
//! Low precision targets cannot hold the values produced by the initializers exactly, so the
//! values are computed in a wider dtype and the tensor is cast back afterwards.
use candle::DType;

/// Which requested dtypes get widened before the values are written.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PromotionRule {
    /// F16 and BF16 are computed as F32.
    Half,
    /// F16, BF16 and F64 are all computed as F32.
    HalfAndDouble,
}

/// The result of looking up a requested dtype in the promotion table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Promotion {
    /// The dtype the initializer produces its values in.
    pub compute: DType,
    /// Whether the materialized tensor has to be cast back to the requested dtype.
    pub cast: bool,
}

// (requested, compute, applies to the `Half` rule)
const PROMOTIONS: [(DType, DType, bool); 3] = [
    (DType::F16, DType::F32, true),
    (DType::BF16, DType::F32, true),
    (DType::F64, DType::F32, false),
];

impl PromotionRule {
    pub fn promote(&self, requested: DType) -> Promotion {
        let entry = PROMOTIONS.iter().find(|(dtype, _, in_half)| {
            *dtype == requested && (*in_half || *self == PromotionRule::HalfAndDouble)
        });
        match entry {
            Some((_, compute, _)) => Promotion {
                compute: *compute,
                cast: true,
            },
            None => Promotion {
                compute: requested,
                cast: false,
            },
        }
    }
}
