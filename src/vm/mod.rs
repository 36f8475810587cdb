mod frame;
mod vm;

pub use vm::{Vm, VmError};
