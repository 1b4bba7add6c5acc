//! Bilinear interpolation kernels for transposed convolutions.
//!
//! A channel-wise transposed convolution with `groups = C`, a filter of shape `(C, 1, K, K)`,
//! `K = 2 * factor - factor % 2`, `stride = factor` and `padding = ceil((factor - 1) / 2)`
//! upsamples a `(B, C, H, W)` feature map to `(B, C, factor * H, factor * W)` when its filter is
//! initialized with [`Bilinear`]. The learning rate and weight decay of such a filter are usually
//! set to zero so that the interpolation coefficients are kept during training.
use crate::promote::PromotionRule;
use crate::{Error, Initializer, Result, TensorDesc, ValueBuffer, Values};
use candle::DType;

/// Largest number of elements a bilinear kernel can be generated for.
pub const MAX_ELEMENTS: usize = 1024 * 1024;

/// Initializes a rank 4 filter `(B, C, K, K)` with the same `(K, K)` bilinear kernel for every
/// leading index.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Bilinear;

/// Weights of a `size x size` bilinear kernel repeated until `elem_count` values are produced.
///
/// Coordinates are taken modulo `size` on the flat index, so every `(size, size)` plane gets the
/// same kernel whatever the leading dimensions are. The kernel peaks at 1 on the center element
/// for odd sizes and on the four central elements for even sizes.
pub fn bilinear_kernel(size: usize, elem_count: usize) -> Vec<f32> {
    let f = size.div_ceil(2) as f64;
    // Same as `(size - 1) / (2f)`, the center coordinate scaled by the factor.
    let c = (2. * f - 1. - (size % 2) as f64) / (2. * f);
    (0..elem_count)
        .map(|i| {
            let x = (i % size) as f64;
            let y = ((i / size) % size) as f64;
            let w = (1. - (x / f - c).abs()) * (1. - (y / f - c).abs());
            w as f32
        })
        .collect()
}

impl Bilinear {
    pub fn generate(&self, desc: &TensorDesc) -> Result<ValueBuffer> {
        let dims = desc.dims();
        if dims.len() != 4 {
            Err(Error::InvalidShape {
                init: self.name(),
                shape: desc.shape().clone(),
                msg: "expected a rank 4 shape",
            })?
        }
        let size = dims[3];
        if dims[2] != size {
            Err(Error::InvalidShape {
                init: self.name(),
                shape: desc.shape().clone(),
                msg: "the last two dimensions must be equal",
            })?
        }
        let promotion = PromotionRule::HalfAndDouble.promote(desc.dtype());
        if promotion.compute != DType::F32 {
            Err(Error::UnsupportedDType {
                init: self.name(),
                dtype: desc.dtype(),
                compute: promotion.compute,
            })?
        }
        let elem_count = desc.elem_count();
        if elem_count > MAX_ELEMENTS {
            Err(Error::SizeLimit {
                init: self.name(),
                elem_count,
                limit: MAX_ELEMENTS,
            })?
        }
        let weight = bilinear_kernel(size, elem_count);
        ValueBuffer::new(desc.shape().clone(), Values::F32(weight))
    }
}

impl Initializer for Bilinear {
    fn name(&self) -> &'static str {
        "bilinear"
    }

    fn initialize(&self, desc: &TensorDesc) -> Result<ValueBuffer> {
        self.generate(desc)
    }
}
