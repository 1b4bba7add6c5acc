use anyhow::Result;
use candle::{DType, Device, Tensor};
use candle_gradcheck::test_utils::assert_close;
use candle_gradcheck::{
    double_grad_check, func_op, grad_check, test_device, triple_grad_check, DifferentiableOp,
    Elementwise, Error, GradCheckConfig, GradCheckSpec, ProgramBuilder,
};

fn coarse() -> GradCheckConfig {
    GradCheckConfig {
        eps: 5e-3,
        atol: 1e-2,
        rtol: 1e-3,
    }
}

fn fine() -> GradCheckConfig {
    GradCheckConfig {
        eps: 1e-4,
        atol: 1e-3,
        rtol: 1e-2,
    }
}

fn inputs(device: &Device) -> Result<(Tensor, Tensor)> {
    let x = Tensor::rand(-1f64, 1f64, (2, 3, 4), device)?;
    let y = Tensor::rand(-1f64, 1f64, (2, 3, 4), device)?;
    Ok((x, y))
}

fn mul_grad(device: &Device) -> Result<()> {
    if device.is_metal() {
        return Ok(());
    }
    let (x, y) = inputs(device)?;
    let report = grad_check(Elementwise::mul(), &[x, y], &coarse())?;
    assert!(report.passed);
    assert_eq!(report.order, 1);
    assert_eq!(report.checked, 48 * 24);
    assert!(report.max_error < 1e-2);

    let (x, y) = inputs(device)?;
    double_grad_check(Elementwise::mul(), &[x.clone(), y.clone()], &coarse())?;
    triple_grad_check(Elementwise::mul(), &[x, y], &coarse())?;
    Ok(())
}

fn add_sub_grad(device: &Device) -> Result<()> {
    if device.is_metal() {
        return Ok(());
    }
    for op in [Elementwise::add(), Elementwise::sub()] {
        let (x, y) = inputs(device)?;
        grad_check(op, &[x.clone(), y.clone()], &coarse())?;
        let report = double_grad_check(op, &[x.clone(), y.clone()], &coarse())?;
        // Second derivatives of a linear operator are all zero.
        assert!(report.max_error < 1e-8, "{report:?}");
        triple_grad_check(op, &[x, y], &coarse())?;
    }
    Ok(())
}

fn div_grad(device: &Device) -> Result<()> {
    if device.is_metal() {
        return Ok(());
    }
    let x = Tensor::rand(-1f64, 1f64, (3, 4), device)?;
    let y = Tensor::rand(0.5f64, 1.5f64, (3, 4), device)?;
    grad_check(Elementwise::div(), &[x.clone(), y.clone()], &fine())?;
    double_grad_check(Elementwise::div(), &[x, y], &fine())?;
    Ok(())
}

fn axis_grad(device: &Device) -> Result<()> {
    if device.is_metal() {
        return Ok(());
    }
    let x = Tensor::rand(-1f64, 1f64, (2, 3, 4), device)?;
    let y = Tensor::rand(-1f64, 1f64, (2, 3), device)?;
    let op = Elementwise::mul().with_axis(0);
    assert_eq!(op.name(), "mul_with_axis0");
    assert_eq!(op.forward(&[x.clone(), y.clone()])?[0].dims(), [2, 3, 4]);
    grad_check(op, &[x.clone(), y.clone()], &coarse())?;
    double_grad_check(op, &[x.clone(), y.clone()], &coarse())?;
    triple_grad_check(op, &[x.clone(), y.clone()], &coarse())?;

    let z = Tensor::rand(-1f64, 1f64, (3, 4), device)?;
    triple_grad_check(Elementwise::add().with_axis(1), &[x.clone(), z], &coarse())?;

    let w = Tensor::rand(-1f64, 1f64, (4, 3), device)?;
    match op.forward(&[x, w]) {
        Err(Error::InvalidArgument { name, .. }) => assert_eq!(name, "axis"),
        res => panic!("unexpected result {res:?}"),
    }
    Ok(())
}

fn direct_and_graph_modes(device: &Device) -> Result<()> {
    if device.is_metal() {
        return Ok(());
    }
    let (x, y) = inputs(device)?;
    let direct = func_op("x*y-x", 2, |xs| (&xs[0] * &xs[1])? - &xs[0]);

    let mut b = ProgramBuilder::new("x*y-x");
    let (px, py) = (b.input(), b.input());
    let xy = b.mul(px, py);
    let out = b.sub(xy, px);
    let program = b.build(&[out])?;
    assert_eq!(program.num_inputs(), 2);
    assert_eq!(program.num_outputs(), 1);

    let seed = Tensor::rand(-1f64, 1f64, (2, 3, 4), device)?;
    let xs = [x.clone(), y.clone()];
    let g_direct = direct.gradient(&xs, &[seed.clone()])?;
    let g_graph = program.gradient(&xs, &[seed])?;
    for (a, b) in g_direct.iter().zip(g_graph.iter()) {
        assert_close(a, b, 0.)?;
    }

    for order in 1..=3 {
        GradCheckSpec::new(direct.clone(), &xs)
            .with_order(order)
            .with_config(coarse())
            .check()?;
        GradCheckSpec::new(program.clone(), &xs)
            .with_order(order)
            .with_config(coarse())
            .check()?;
    }
    Ok(())
}

fn custom_seeds(device: &Device) -> Result<()> {
    if device.is_metal() {
        return Ok(());
    }
    let (x, y) = inputs(device)?;
    let seed = Tensor::rand(-1f64, 1f64, (2, 3, 4), device)?;
    let report = GradCheckSpec::new(Elementwise::mul(), &[x.clone(), y.clone()])
        .with_order(2)
        .with_seeds(vec![vec![seed]])
        .with_config(coarse())
        .check()?;
    assert_eq!(report.op, "grad(mul)");

    match GradCheckSpec::new(Elementwise::mul(), &[x.clone(), y.clone()])
        .with_order(2)
        .with_seeds(vec![vec![Tensor::ones(3, DType::F64, device)?]])
        .run()
    {
        Err(Error::InvalidArgument { name, .. }) => assert_eq!(name, "seeds"),
        res => panic!("unexpected result {res:?}"),
    }
    let ones = Tensor::ones((2, 3, 4), DType::F64, device)?;
    match GradCheckSpec::new(Elementwise::mul(), &[x, y])
        .with_order(2)
        .with_seeds(vec![vec![ones.clone()], vec![ones]])
        .run()
    {
        Err(Error::InvalidArgument { name, .. }) => assert_eq!(name, "seeds"),
        res => panic!("unexpected result {res:?}"),
    }
    Ok(())
}

test_device!(mul_grad, mul_grad_cpu, mul_grad_gpu, mul_grad_metal);
test_device!(add_sub_grad, add_sub_grad_cpu, add_sub_grad_gpu, add_sub_grad_metal);
test_device!(div_grad, div_grad_cpu, div_grad_gpu, div_grad_metal);
test_device!(axis_grad, axis_grad_cpu, axis_grad_gpu, axis_grad_metal);
test_device!(
    direct_and_graph_modes,
    direct_and_graph_modes_cpu,
    direct_and_graph_modes_gpu,
    direct_and_graph_modes_metal
);
test_device!(custom_seeds, custom_seeds_cpu, custom_seeds_gpu, custom_seeds_metal);

/// `x * y` with a gradient that is off by a factor two for `x`.
struct WrongMul;

impl DifferentiableOp for WrongMul {
    fn name(&self) -> String {
        "wrong_mul".to_string()
    }

    fn forward(&self, xs: &[Tensor]) -> candle_gradcheck::Result<Vec<Tensor>> {
        Ok(vec![(&xs[0] * &xs[1])?])
    }

    fn gradient(&self, xs: &[Tensor], seeds: &[Tensor]) -> candle_gradcheck::Result<Vec<Tensor>> {
        let gx = ((&seeds[0] * &xs[1])? * 2.)?;
        let gy = (&seeds[0] * &xs[0])?;
        Ok(vec![gx, gy])
    }
}

#[test]
fn wrong_gradient_is_reported() -> Result<()> {
    let device = &Device::Cpu;
    let x = Tensor::new(&[0.5f64, -0.25, 0.75], device)?;
    let y = Tensor::new(&[1f64, 0.5, -2.], device)?;

    let report = GradCheckSpec::new(WrongMul, &[x.clone(), y.clone()])
        .with_config(coarse())
        .run()?;
    assert!(!report.passed);
    assert_eq!(report.failures, 3);
    let worst = report.worst.ok_or_else(|| anyhow::anyhow!("no mismatch"))?;
    assert_eq!(worst.input, 0);
    assert_eq!(worst.element, 2);
    assert_eq!(worst.output, 2);
    assert!((worst.analytic - -4.).abs() < 1e-12);
    assert!((worst.numeric - -2.).abs() < 1e-6);

    match grad_check(WrongMul, &[x, y], &coarse()) {
        Err(Error::ToleranceExceeded {
            op,
            order,
            max_error,
            at,
        }) => {
            assert_eq!(op, "wrong_mul");
            assert_eq!(order, 1);
            assert!((max_error - 2.).abs() < 1e-6);
            assert_eq!(at.input, 0);
        }
        res => panic!("unexpected result {res:?}"),
    }
    Ok(())
}

#[test]
fn invalid_arguments() -> Result<()> {
    let device = &Device::Cpu;
    let x = Tensor::new(&[0.5f64, -0.25], device)?;
    let y = Tensor::new(&[1f64, 0.5], device)?;

    match GradCheckSpec::new(Elementwise::add(), &[x.clone(), y.clone()])
        .with_order(0)
        .run()
    {
        Err(Error::InvalidArgument { name, .. }) => assert_eq!(name, "order"),
        res => panic!("unexpected result {res:?}"),
    }

    let config = GradCheckConfig {
        eps: 0.,
        ..Default::default()
    };
    match grad_check(Elementwise::add(), &[x.clone(), y.clone()], &config) {
        Err(Error::InvalidArgument { name, .. }) => assert_eq!(name, "eps"),
        res => panic!("unexpected result {res:?}"),
    }

    let ints = Tensor::new(&[1u32, 2], device)?;
    match grad_check(Elementwise::add(), &[x.clone(), ints], &GradCheckConfig::default()) {
        Err(Error::InvalidArgument { name, .. }) => assert_eq!(name, "inputs"),
        res => panic!("unexpected result {res:?}"),
    }

    match grad_check(Elementwise::add(), &[x], &GradCheckConfig::default()) {
        Err(Error::InvalidArgument { name, .. }) => assert_eq!(name, "inputs"),
        res => panic!("unexpected result {res:?}"),
    }
    Ok(())
}

#[test]
fn higher_orders_beyond_three() -> Result<()> {
    let device = &Device::Cpu;
    let x = Tensor::new(&[0.5f64, -0.25], device)?;
    let y = Tensor::new(&[1f64, 0.5], device)?;
    let report = GradCheckSpec::new(Elementwise::mul(), &[x, y])
        .with_order(4)
        .with_config(coarse())
        .check()?;
    assert_eq!(report.op, "grad(grad(grad(mul)))");
    Ok(())
}

#[test]
fn nodes_from_another_builder() -> Result<()> {
    let mut a = ProgramBuilder::new("a");
    let (ax, ay) = (a.input(), a.input());
    let a_out = a.add(ax, ay);

    // Indices 0 and 1 exist in both builders.
    let mut b = ProgramBuilder::new("b");
    let (bx, _) = (b.input(), b.input());
    let mixed = b.mul(bx, ay);
    match b.build(&[mixed]) {
        Err(Error::InvalidArgument { name, .. }) => assert_eq!(name, "nodes"),
        res => panic!("unexpected result {res:?}"),
    }

    let mut c = ProgramBuilder::new("c");
    let (cx, cy) = (c.input(), c.input());
    c.sub(cx, cy);
    match c.build(&[ax]) {
        Err(Error::InvalidArgument { name, .. }) => assert_eq!(name, "nodes"),
        res => panic!("unexpected result {res:?}"),
    }

    let program = a.build(&[a_out])?;
    assert_eq!(program.num_inputs(), 2);
    Ok(())
}
