//! Shared utilities underneath the storage engine and the property decoder.

pub mod binary;
pub mod codepage;
pub mod guid;

pub use binary::{BinaryError, BinaryResult};
pub use guid::Guid;
