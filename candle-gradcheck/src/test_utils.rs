/// Instantiates a test function taking a `&Device` once per available device.
///
/// The generated tests return the `Result` type in scope at the call site.
#[macro_export]
macro_rules! test_device {
    ($fn_name: ident, $test_cpu: ident, $test_cuda: ident, $test_metal: ident) => {
        #[test]
        fn $test_cpu() -> Result<()> {
            $fn_name(&candle::Device::Cpu)
        }

        #[cfg(feature = "cuda")]
        #[test]
        fn $test_cuda() -> Result<()> {
            $fn_name(&candle::Device::new_cuda(0)?)
        }

        #[cfg(feature = "metal")]
        #[test]
        fn $test_metal() -> Result<()> {
            $fn_name(&candle::Device::new_metal(0)?)
        }
    };
}

/// Element-wise comparison of two float tensors of the same shape.
pub fn assert_close(lhs: &candle::Tensor, rhs: &candle::Tensor, tol: f64) -> candle::Result<()> {
    let max_diff = (lhs - rhs)?
        .abs()?
        .flatten_all()?
        .to_dtype(candle::DType::F64)?
        .max(0)?
        .to_scalar::<f64>()?;
    if max_diff > tol {
        candle::bail!("tensors differ by {max_diff}, more than {tol}")
    }
    Ok(())
}
