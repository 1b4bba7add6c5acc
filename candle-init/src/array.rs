//! Initialization from a caller supplied dense array.
use crate::promote::PromotionRule;
use crate::{Error, Initializer, Result, TensorDesc, ValueBuffer, Values};
use candle::{DType, Shape};

/// Largest number of elements an array initializer accepts, checked on the shape before the
/// values are looked at. Bigger payloads should be saved to a file and loaded instead.
pub const MAX_ELEMENTS: usize = 1024 * 1024 * 1024;

/// Initializes a tensor with a copy of a dense, row-major array.
///
/// The materialized tensor takes the shape of the array, which has to be assignable to the
/// shape of the tensor being initialized: same element count, or broadcastable to it.
#[derive(Debug, Clone, PartialEq)]
pub struct ArrayInit {
    shape: Shape,
    values: Vec<f64>,
}

impl ArrayInit {
    pub fn new<S: Into<Shape>>(values: Vec<f64>, shape: S) -> Result<Self> {
        let shape = shape.into();
        let elem_count = shape.elem_count();
        if elem_count > MAX_ELEMENTS {
            Err(Error::SizeLimit {
                init: "array",
                elem_count,
                limit: MAX_ELEMENTS,
            })?
        }
        if values.len() != elem_count {
            return Err(Error::InvalidShape {
                init: "array",
                shape,
                msg: "element count does not match the number of values",
            });
        }
        Ok(Self { shape, values })
    }

    pub fn from_slice<S: Into<Shape>>(values: &[f64], shape: S) -> Result<Self> {
        Self::new(values.to_vec(), shape)
    }

    pub fn shape(&self) -> &Shape {
        &self.shape
    }

    pub fn values(&self) -> &[f64] {
        &self.values
    }

    fn to_u32(&self) -> Result<Vec<u32>> {
        self.values
            .iter()
            .map(|&v| {
                if v.is_finite() && v >= 0. && v <= u32::MAX as f64 {
                    Ok(v as u32)
                } else {
                    Err(Error::InvalidArgument {
                        name: "values",
                        msg: format!("{v} cannot be stored as u32"),
                    })
                }
            })
            .collect()
    }
}

/// Checks that a `src` array can be written into a tensor of shape `dst`.
fn is_assignable(src: &Shape, dst: &Shape) -> bool {
    if src.elem_count() == dst.elem_count() {
        return true;
    }
    let (src, dst) = (src.dims(), dst.dims());
    if src.len() > dst.len() {
        return false;
    }
    src.iter()
        .rev()
        .zip(dst.iter().rev())
        .all(|(&s, &d)| s == d || s == 1)
}

impl Initializer for ArrayInit {
    fn name(&self) -> &'static str {
        "array"
    }

    fn initialize(&self, desc: &TensorDesc) -> Result<ValueBuffer> {
        let compute = PromotionRule::Half.promote(desc.dtype()).compute;
        if compute != DType::F32 && compute != DType::U32 {
            Err(Error::UnsupportedDType {
                init: self.name(),
                dtype: desc.dtype(),
                compute,
            })?
        }
        if !is_assignable(&self.shape, desc.shape()) {
            Err(Error::InvalidShape {
                init: self.name(),
                shape: self.shape.clone(),
                msg: "array cannot be assigned to the target tensor",
            })?
        }
        let values = if compute == DType::U32 {
            Values::U32(self.to_u32()?)
        } else {
            Values::F32(self.values.iter().map(|&v| v as f32).collect())
        };
        ValueBuffer::new(self.shape.clone(), values)
    }
}
