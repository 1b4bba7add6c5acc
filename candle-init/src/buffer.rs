use crate::{Error, Result};
use candle::{DType, Device, Shape, Tensor};

/// The shape and dtype of a tensor that is about to be initialized.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TensorDesc {
    shape: Shape,
    dtype: DType,
}

impl TensorDesc {
    pub fn new<S: Into<Shape>>(shape: S, dtype: DType) -> Self {
        Self {
            shape: shape.into(),
            dtype,
        }
    }

    pub fn shape(&self) -> &Shape {
        &self.shape
    }

    pub fn dims(&self) -> &[usize] {
        self.shape.dims()
    }

    pub fn dtype(&self) -> DType {
        self.dtype
    }

    pub fn elem_count(&self) -> usize {
        self.shape.elem_count()
    }
}

/// Flat values in one of the dtypes an initializer can compute in.
#[derive(Debug, Clone, PartialEq)]
pub enum Values {
    F32(Vec<f32>),
    F64(Vec<f64>),
    U32(Vec<u32>),
}

impl Values {
    pub fn dtype(&self) -> DType {
        match self {
            Self::F32(_) => DType::F32,
            Self::F64(_) => DType::F64,
            Self::U32(_) => DType::U32,
        }
    }

    pub fn len(&self) -> usize {
        match self {
            Self::F32(v) => v.len(),
            Self::F64(v) => v.len(),
            Self::U32(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Values produced by an initializer, logically laid out with `shape` in row-major order.
#[derive(Debug, Clone, PartialEq)]
pub struct ValueBuffer {
    shape: Shape,
    values: Values,
}

impl ValueBuffer {
    pub fn new<S: Into<Shape>>(shape: S, values: Values) -> Result<Self> {
        let shape = shape.into();
        if values.len() != shape.elem_count() {
            return Err(Error::InvalidShape {
                init: "value_buffer",
                shape,
                msg: "element count does not match the number of values",
            });
        }
        Ok(Self { shape, values })
    }

    pub fn shape(&self) -> &Shape {
        &self.shape
    }

    pub fn dtype(&self) -> DType {
        self.values.dtype()
    }

    pub fn values(&self) -> &Values {
        &self.values
    }

    pub fn elem_count(&self) -> usize {
        self.values.len()
    }

    /// Values widened to f64, mostly useful for inspection.
    pub fn to_f64_vec(&self) -> Vec<f64> {
        match &self.values {
            Values::F32(v) => v.iter().map(|&v| v as f64).collect(),
            Values::F64(v) => v.clone(),
            Values::U32(v) => v.iter().map(|&v| v as f64).collect(),
        }
    }

    /// Copies the values into a new tensor on `device`, in the buffer dtype.
    pub fn to_tensor(&self, device: &Device) -> Result<Tensor> {
        let shape = self.shape.clone();
        let tensor = match &self.values {
            Values::F32(v) => Tensor::from_vec(v.clone(), shape, device)?,
            Values::F64(v) => Tensor::from_vec(v.clone(), shape, device)?,
            Values::U32(v) => Tensor::from_vec(v.clone(), shape, device)?,
        };
        Ok(tensor)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn value_buffer_length() -> Result<()> {
        let buf = ValueBuffer::new((2, 2), Values::U32(vec![1, 2, 3, 4]))?;
        assert_eq!(buf.shape().dims(), [2, 2]);
        assert_eq!(buf.dtype(), DType::U32);
        assert_eq!(buf.to_f64_vec(), [1., 2., 3., 4.]);
        match ValueBuffer::new((2, 3), Values::F32(vec![0.; 4])) {
            Err(Error::InvalidShape { shape, .. }) => assert_eq!(shape.dims(), [2, 3]),
            res => panic!("unexpected result {res:?}"),
        }
        Ok(())
    }
}
