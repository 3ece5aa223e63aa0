//! Bounds-checked little-endian primitive reads over byte slices.
//!
//! Every multi-byte integer in a compound file and in property-set streams is
//! little-endian on disk. These helpers never panic on short input; they
//! report how much data the read wanted so callers can wrap the failure in
//! the error kind that fits their context.

use zerocopy::{F32, F64, FromBytes, I16, I32, I64, LE, U16, U32, U64};

/// Binary parsing error type
#[derive(Debug, Clone)]
pub enum BinaryError {
    /// Not enough data to read the requested type
    InsufficientData { expected: usize, available: usize },
}

impl std::fmt::Display for BinaryError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BinaryError::InsufficientData {
                expected,
                available,
            } => {
                write!(
                    f,
                    "insufficient data: expected {}, got {}",
                    expected, available
                )
            },
        }
    }
}

impl std::error::Error for BinaryError {}

/// Result type for binary operations
pub type BinaryResult<T> = Result<T, BinaryError>;

macro_rules! le_reader {
    ($name:ident, $prim:ty, $wire:ty, $width:expr) => {
        /// Read a little-endian value of the named width at `offset`.
        #[inline]
        pub fn $name(data: &[u8], offset: usize) -> BinaryResult<$prim> {
            let end = offset.checked_add($width).ok_or(BinaryError::InsufficientData {
                expected: usize::MAX,
                available: data.len(),
            })?;
            let bytes = data.get(offset..end).ok_or(BinaryError::InsufficientData {
                expected: end,
                available: data.len(),
            })?;
            // Infallible once the slice has the right length.
            Ok(<$wire>::read_from_bytes(bytes)
                .map(|v| v.get())
                .unwrap_or_default())
        }
    };
}

le_reader!(read_u16_le, u16, U16<LE>, 2);
le_reader!(read_i16_le, i16, I16<LE>, 2);
le_reader!(read_u32_le, u32, U32<LE>, 4);
le_reader!(read_i32_le, i32, I32<LE>, 4);
le_reader!(read_u64_le, u64, U64<LE>, 8);
le_reader!(read_i64_le, i64, I64<LE>, 8);
le_reader!(read_f32_le, f32, F32<LE>, 4);
le_reader!(read_f64_le, f64, F64<LE>, 8);

/// Borrow `len` bytes at `offset`.
#[inline]
pub fn read_bytes(data: &[u8], offset: usize, len: usize) -> BinaryResult<&[u8]> {
    let end = offset.checked_add(len).ok_or(BinaryError::InsufficientData {
        expected: usize::MAX,
        available: data.len(),
    })?;
    data.get(offset..end).ok_or(BinaryError::InsufficientData {
        expected: end,
        available: data.len(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_read_u16_le() {
        let data = [0x34, 0x12, 0x78, 0x56];
        assert!(read_u16_le(&data, 0).is_ok_and(|v| v == 0x1234));
        assert!(read_u16_le(&data, 2).is_ok_and(|v| v == 0x5678));
        assert!(read_u16_le(&data, 3).is_err());
    }

    #[test]
    fn test_read_i16_le() {
        let data = [0xFF, 0xFF];
        assert!(read_i16_le(&data, 0).is_ok_and(|v| v == -1));
    }

    #[test]
    fn test_read_u32_le() {
        let data = [0x78, 0x56, 0x34, 0x12];
        assert!(read_u32_le(&data, 0).is_ok_and(|v| v == 0x12345678));
        assert!(read_u32_le(&data, 1).is_err());
    }

    #[test]
    fn test_read_u64_le() {
        let data = [1, 0, 0, 0, 0, 0, 0, 0x80];
        assert!(read_u64_le(&data, 0).is_ok_and(|v| v == 0x8000_0000_0000_0001));
        assert!(read_u64_le(&data, 1).is_err());
    }

    #[test]
    fn test_read_f64_le() {
        let data = 1.5f64.to_le_bytes();
        assert!(read_f64_le(&data, 0).is_ok_and(|v| v == 1.5));
    }

    #[test]
    fn test_read_bytes_overflow() {
        let data = [0u8; 4];
        assert!(read_bytes(&data, 2, 2).is_ok());
        assert!(read_bytes(&data, 2, 3).is_err());
        assert!(read_bytes(&data, usize::MAX, 2).is_err());
    }
}
