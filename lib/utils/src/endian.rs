//! ## Endianness Module
//! This module provides some structs to better resolve the data in specific endianness rules
//!
//! All the types declared here implement [EndianData<T>],
//! which defines [EndianData<T>::value] to parse the data into the endianness of the current target.
//! Values are always decoded from byte slices, so unaligned property data is fine.

use alloc::vec::Vec;

///[u16] in Big Endianness
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BigEndian16(u16);

///[u16] in Little Endianness
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LittleEndian16(u16);

///[u32] in Big Endianness
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BigEndian32(u32);

///[u32] in Little Endianness
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LittleEndian32(u32);

///[u64] in Big Endianness
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BigEndian64(u64);

///[u64] in Little Endianness
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LittleEndian64(u64);

/// This trait defines a packed data in memory with some specific endianness.
pub trait EndianData<T>: Copy + Clone {
    /// Width of the packed value in bytes.
    const SIZE: usize;

    /// Parse the value into the endianness of the current target.
    fn value(&self) -> T;

    /// Take the first [Self::SIZE] bytes of `bytes` as the raw packed value.
    ///
    /// Return `None` if the slice is too short.
    fn from_bytes(bytes: &[u8]) -> Option<Self>;

    /// Pack a native value.
    fn pack(value: T) -> Self;
}

/// Implement an [EndianData<T>] for a specific type.
///
/// `$load` converts the stored word into native order and `$store` does the reverse.
macro_rules! impl_converter {
    ($type: ident, $tval: ty, $load: ident, $store: ident) => {
        impl EndianData<$tval> for $type {
            const SIZE: usize = size_of::<$tval>();

            #[inline(always)]
            fn value(&self) -> $tval {
                <$tval>::$load(self.0)
            }

            #[inline(always)]
            fn from_bytes(bytes: &[u8]) -> Option<Self> {
                let raw = bytes.get(..Self::SIZE)?.try_into().ok()?;
                Some($type(<$tval>::from_ne_bytes(raw)))
            }

            #[inline(always)]
            fn pack(value: $tval) -> Self {
                $type(<$tval>::$store(value))
            }
        }
    };
}

impl_converter!(BigEndian16, u16, from_be, to_be);
impl_converter!(BigEndian32, u32, from_be, to_be);
impl_converter!(BigEndian64, u64, from_be, to_be);

impl_converter!(LittleEndian16, u16, from_le, to_le);
impl_converter!(LittleEndian32, u32, from_le, to_le);
impl_converter!(LittleEndian64, u64, from_le, to_le);

/// Decode a whole byte slice as consecutive packed values.
///
/// Return `None` if the length is not a multiple of the value width.
pub fn decode_all<T, E: EndianData<T>>(bytes: &[u8]) -> Option<Vec<T>> {
    if bytes.len() % E::SIZE != 0 {
        return None;
    }
    bytes
        .chunks_exact(E::SIZE)
        .map(|chunk| E::from_bytes(chunk).map(|packed| packed.value()))
        .collect()
}
