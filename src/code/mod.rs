mod code;

pub use code::{lookup, make, read_operands, read_u16, Definition, Instructions, Opcode};
