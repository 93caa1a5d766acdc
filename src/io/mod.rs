//! Low-level I/O helpers.

mod atomic;
mod endian;

pub use atomic::write_atomic;
pub use endian::{read_u16_be, read_u16_le, read_u32_be, read_u32_le, read_u64_le, ByteOrder};
