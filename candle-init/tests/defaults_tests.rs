use anyhow::Result;
use candle::{DType, Device};
use candle_init::init::DEFAULT_KAIMING_NORMAL;
use candle_init::{
    calculate_gain, tensor, Bilinear, DefaultsConfig, Error, Init, InitDefaults, Initializer,
    NonLinearity,
};
use std::sync::Arc;

#[test]
fn set_and_clear() {
    let mut defaults = InitDefaults::new();
    assert!(defaults.weight().is_none());
    assert!(defaults.bias().is_none());

    let weight: Arc<dyn Initializer> = Arc::new(Bilinear);
    let bias: Arc<dyn Initializer> = Arc::new(Init::Const(0.5));
    defaults.set(Some(weight.clone()), Some(bias.clone()));
    assert!(defaults.weight().is_some_and(|w| Arc::ptr_eq(w, &weight)));
    assert!(defaults.bias().is_some_and(|b| Arc::ptr_eq(b, &bias)));

    defaults.set(None, Some(bias.clone()));
    assert!(defaults.weight().is_none());
    assert!(defaults.bias().is_some_and(|b| Arc::ptr_eq(b, &bias)));

    defaults.set(None, None);
    assert!(defaults.weight().is_none());
    assert!(defaults.bias().is_none());
}

#[test]
fn from_config() -> Result<()> {
    let config = DefaultsConfig::from_json(
        r#"{"weight": {"kind": "array", "shape": [2], "values": [1.5, -2]}, "bias": {"kind": "const", "value": 0.1}}"#,
    )?;
    let defaults = InitDefaults::from_config(&config)?;
    let weight = defaults.weight().map(|w| w.name());
    assert_eq!(weight, Some("array"));
    let bias = defaults.bias().map(|b| b.name());
    assert_eq!(bias, Some("const"));

    if let Some(weight) = defaults.weight() {
        let t = tensor(weight.as_ref(), 2, DType::F32, &Device::Cpu)?;
        assert_eq!(t.to_vec1::<f32>()?, [1.5, -2.]);
    }

    let config = DefaultsConfig::from_json("{}")?;
    assert_eq!(config, DefaultsConfig::default());
    Ok(())
}

#[test]
fn gains() -> Result<()> {
    assert_eq!(calculate_gain("relu", None)?, 2f64.sqrt());
    assert_eq!(calculate_gain("leaky_relu", Some(1.0))?, 1.);
    assert_eq!(calculate_gain("tanh", None)?, 5. / 3.);
    assert_eq!(calculate_gain("conv2d_transpose", None)?, 1.);
    assert_eq!(calculate_gain("selu", None)?, 0.75);
    assert!(matches!(
        calculate_gain("softplus", None),
        Err(Error::UnsupportedNonLinearity(_))
    ));
    assert_eq!("sigmoid".parse::<NonLinearity>()?, NonLinearity::Sigmoid);
    Ok(())
}

#[test]
fn random_inits() -> Result<()> {
    let device = Device::Cpu;
    let t = tensor(&Init::Uniform { lo: -0.5, up: 0.5 }, (64, 8), DType::F32, &device)?;
    let values = t.flatten_all()?.to_vec1::<f32>()?;
    assert!(values.iter().all(|v| (-0.5..0.5).contains(v)));

    let t = tensor(&DEFAULT_KAIMING_NORMAL, (128, 256), DType::F64, &device)?;
    let std = t.sqr()?.mean_all()?.sqrt()?.to_scalar::<f64>()?;
    let expected = 2f64.sqrt() / 256f64.sqrt();
    assert!((std - expected).abs() < 0.01, "{std} {expected}");

    let t = tensor(&Init::Const(2.), 3, DType::BF16, &device)?;
    assert_eq!(t.dtype(), DType::BF16);
    assert_eq!(t.to_dtype(DType::F32)?.to_vec1::<f32>()?, [2., 2., 2.]);

    assert!(tensor(&Init::Uniform { lo: 1., up: 1. }, 3, DType::F32, &device).is_err());
    assert!(tensor(&Init::Const(0.), 3, DType::U32, &device).is_err());
    Ok(())
}
