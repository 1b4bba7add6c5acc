//! Writing initializer values into tensors.
//!
//! Initializers only compute values, creating the tensor holding them is delegated to a
//! [`TensorMaterializer`]. [`Eager`] runs every step immediately on a device while
//! [`InitProgram`] records the steps so that they can be executed later, possibly several times.
use crate::{Error, Initializer, Result, TensorDesc, ValueBuffer};
use candle::{DType, Device, Shape, Tensor, Var};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Creates, fills and casts tensors on behalf of an initializer.
pub trait TensorMaterializer {
    type Handle;

    /// Creates a tensor of the given shape and dtype, its content is unspecified until values
    /// are assigned.
    fn create_tensor(&mut self, name: &str, shape: &Shape, dtype: DType) -> Result<Self::Handle>;

    /// Writes `values` to `tensor`, the tensor takes the shape of the buffer.
    fn assign_values(&mut self, tensor: &mut Self::Handle, values: &ValueBuffer) -> Result<()>;

    /// Returns a copy of `tensor` converted to `dtype`, named `name`.
    fn cast_tensor(
        &mut self,
        name: &str,
        tensor: &Self::Handle,
        dtype: DType,
    ) -> Result<Self::Handle>;
}

/// Initializes a tensor named `name` described by `desc` with the values from `init`.
///
/// Values computed in a wider dtype than requested go through a temporary tensor that is cast
/// to the requested dtype.
pub fn init_tensor<M: TensorMaterializer>(
    init: &dyn Initializer,
    name: &str,
    desc: &TensorDesc,
    materializer: &mut M,
) -> Result<M::Handle> {
    let buffer = init.initialize(desc)?;
    if buffer.dtype() == desc.dtype() {
        let mut out = materializer.create_tensor(name, buffer.shape(), desc.dtype())?;
        materializer.assign_values(&mut out, &buffer)?;
        return Ok(out);
    }
    tracing::debug!(
        init = init.name(),
        name,
        from = buffer.dtype().as_str(),
        to = desc.dtype().as_str(),
        "casting initialized values"
    );
    let tmp_name = format!("{}_init.{name}.tmp", init.name());
    let mut tmp = materializer.create_tensor(&tmp_name, buffer.shape(), buffer.dtype())?;
    materializer.assign_values(&mut tmp, &buffer)?;
    materializer.cast_tensor(name, &tmp, desc.dtype())
}

/// Creates a new tensor with the specified shape, device, and initialization.
pub fn tensor<S: Into<Shape>>(
    init: &dyn Initializer,
    s: S,
    dtype: DType,
    device: &Device,
) -> Result<Tensor> {
    let desc = TensorDesc::new(s, dtype);
    init_tensor(init, init.name(), &desc, &mut Eager::new(device))
}

/// Same as [`tensor`] but returns a variable that can be optimized.
pub fn var<S: Into<Shape>>(
    init: &dyn Initializer,
    s: S,
    dtype: DType,
    device: &Device,
) -> Result<Var> {
    Ok(Var::from_tensor(&tensor(init, s, dtype, device)?)?)
}

/// Materializes tensors immediately on a device.
#[derive(Debug, Clone)]
pub struct Eager {
    device: Device,
}

impl Eager {
    pub fn new(device: &Device) -> Self {
        Self {
            device: device.clone(),
        }
    }

    pub fn device(&self) -> &Device {
        &self.device
    }
}

impl TensorMaterializer for Eager {
    type Handle = Tensor;

    fn create_tensor(&mut self, _name: &str, shape: &Shape, dtype: DType) -> Result<Tensor> {
        Ok(Tensor::zeros(shape, dtype, &self.device)?)
    }

    fn assign_values(&mut self, tensor: &mut Tensor, values: &ValueBuffer) -> Result<()> {
        let t = values.to_tensor(&self.device)?;
        *tensor = t.to_dtype(tensor.dtype())?;
        Ok(())
    }

    fn cast_tensor(&mut self, _name: &str, tensor: &Tensor, dtype: DType) -> Result<Tensor> {
        Ok(tensor.to_dtype(dtype)?)
    }
}

/// Index of a tensor declared in an [`InitProgram`], only valid for the program that
/// returned it and its clones.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SlotId {
    program: usize,
    index: usize,
}

fn next_program_id() -> usize {
    static COUNTER: AtomicUsize = AtomicUsize::new(1);
    COUNTER.fetch_add(1, Ordering::Relaxed)
}

#[derive(Debug, Clone, PartialEq)]
pub struct Slot {
    pub name: String,
    pub shape: Shape,
    pub dtype: DType,
}

/// A recorded initialization step.
#[derive(Debug, Clone, PartialEq)]
pub enum InitOp {
    Assign { dst: SlotId, values: ValueBuffer },
    Cast { src: SlotId, dst: SlotId },
}

/// Records initialization steps so that they can be run later.
///
/// ```rust
/// use candle::{DType, Device};
/// use candle_init::{init_tensor, Bilinear, InitProgram, TensorDesc};
/// # fn main() -> candle_init::Result<()> {
/// let mut program = InitProgram::new();
/// let desc = TensorDesc::new((3, 1, 4, 4), DType::F16);
/// let slot = init_tensor(&Bilinear, "upsample.weight", &desc, &mut program)?;
/// // The values are computed in f32 and cast back to f16.
/// assert_eq!(program.ops().len(), 2);
/// let tensors = program.run(&Device::Cpu)?;
/// let name = program.slot(slot).map(|s| s.name.as_str());
/// let weight = &tensors[name.unwrap_or_default()];
/// assert_eq!(weight.dtype(), DType::F16);
/// # Ok(()) }
/// ```
#[derive(Debug, Clone)]
pub struct InitProgram {
    id: usize,
    slots: Vec<Slot>,
    ops: Vec<InitOp>,
}

impl Default for InitProgram {
    fn default() -> Self {
        Self {
            id: next_program_id(),
            slots: vec![],
            ops: vec![],
        }
    }
}

impl InitProgram {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn slots(&self) -> &[Slot] {
        &self.slots
    }

    /// The slot behind `id`, `None` when `id` was returned by another program.
    pub fn slot(&self, id: SlotId) -> Option<&Slot> {
        if id.program != self.id {
            return None;
        }
        self.slots.get(id.index)
    }

    fn slot_mut(&mut self, id: SlotId) -> Result<&mut Slot> {
        if id.program != self.id {
            Err(Error::InvalidArgument {
                name: "slot",
                msg: format!("{id:?} belongs to another program"),
            })?
        }
        match self.slots.get_mut(id.index) {
            Some(slot) => Ok(slot),
            None => Err(Error::InvalidArgument {
                name: "slot",
                msg: format!("{id:?} is not declared"),
            }),
        }
    }

    fn checked_slot(&self, id: SlotId) -> Result<&Slot> {
        match self.slot(id) {
            Some(slot) => Ok(slot),
            None => Err(Error::InvalidArgument {
                name: "slot",
                msg: format!("{id:?} is not declared in this program"),
            }),
        }
    }

    pub fn ops(&self) -> &[InitOp] {
        &self.ops
    }

    /// Executes the recorded steps and returns every assigned or cast tensor by name.
    pub fn run(&self, device: &Device) -> Result<HashMap<String, Tensor>> {
        let mut values: HashMap<SlotId, Tensor> = HashMap::new();
        for op in self.ops.iter() {
            match op {
                InitOp::Assign { dst, values: buffer } => {
                    let slot = self.checked_slot(*dst)?;
                    let t = buffer.to_tensor(device)?.to_dtype(slot.dtype)?;
                    values.insert(*dst, t);
                }
                InitOp::Cast { src, dst } => {
                    let t = match values.get(src) {
                        Some(t) => t.to_dtype(self.checked_slot(*dst)?.dtype)?,
                        None => Err(Error::InvalidArgument {
                            name: "program",
                            msg: format!(
                                "{} is cast before being assigned",
                                self.checked_slot(*src)?.name
                            ),
                        })?,
                    };
                    values.insert(*dst, t);
                }
            }
        }
        let mut named = HashMap::with_capacity(values.len());
        for (id, t) in values {
            named.insert(self.checked_slot(id)?.name.clone(), t);
        }
        Ok(named)
    }
}

impl TensorMaterializer for InitProgram {
    type Handle = SlotId;

    fn create_tensor(&mut self, name: &str, shape: &Shape, dtype: DType) -> Result<SlotId> {
        if self.slots.iter().any(|s| s.name == name) {
            Err(Error::InvalidArgument {
                name: "name",
                msg: format!("{name} is already declared"),
            })?
        }
        self.slots.push(Slot {
            name: name.to_string(),
            shape: shape.clone(),
            dtype,
        });
        Ok(SlotId {
            program: self.id,
            index: self.slots.len() - 1,
        })
    }

    fn assign_values(&mut self, tensor: &mut SlotId, values: &ValueBuffer) -> Result<()> {
        self.slot_mut(*tensor)?.shape = values.shape().clone();
        self.ops.push(InitOp::Assign {
            dst: *tensor,
            values: values.clone(),
        });
        Ok(())
    }

    fn cast_tensor(&mut self, name: &str, tensor: &SlotId, dtype: DType) -> Result<SlotId> {
        let shape = self.checked_slot(*tensor)?.shape.clone();
        let dst = self.create_tensor(name, &shape, dtype)?;
        self.ops.push(InitOp::Cast { src: *tensor, dst });
        Ok(dst)
    }
}
