use alloc::{boxed::Box, vec::Vec};
use core::{fmt, str};
use utils::endian::{BigEndian32, BigEndian64, EndianData, decode_all};

/// A named property and its raw (big-endian) payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Property {
    pub name: Box<str>,
    pub data: Box<[u8]>,
}

/// Constructors, used by the FDT reader and by platform code that assembles a tree by hand.
impl Property {
    pub fn new(name: impl AsRef<str>, data: impl Into<Box<[u8]>>) -> Property {
        Property {
            name: Box::from(name.as_ref()),
            data: data.into(),
        }
    }

    /// A property with no payload, such as `dma-coherent`.
    pub fn empty(name: impl AsRef<str>) -> Property {
        Property::new(name, Vec::new())
    }

    pub fn from_u32(name: impl AsRef<str>, value: u32) -> Property {
        Property::from_cells(name, &[value])
    }

    pub fn from_cells(name: impl AsRef<str>, cells: &[u32]) -> Property {
        let data: Vec<u8> = cells.iter().flat_map(|cell| cell.to_be_bytes()).collect();
        Property::new(name, data)
    }

    pub fn from_string(name: impl AsRef<str>, value: &str) -> Property {
        Property::from_strlist(name, &[value])
    }

    /// Encode `values` as consecutive NUL-terminated strings.
    pub fn from_strlist(name: impl AsRef<str>, values: &[&str]) -> Property {
        let mut data = Vec::new();
        for value in values {
            data.extend_from_slice(value.as_bytes());
            data.push(0);
        }
        Property::new(name, data)
    }
}

impl Property {
    pub fn value_as_u32(&self) -> Result<u32, PropertyError> {
        Ok(BigEndian32::from_bytes(&self.data)
            .ok_or(PropertyError::InvalidPropFormat)?
            .value())
    }

    pub fn value_as_u64(&self) -> Result<u64, PropertyError> {
        Ok(BigEndian64::from_bytes(&self.data)
            .ok_or(PropertyError::InvalidPropFormat)?
            .value())
    }

    /// Decode the whole payload as 32-bit cells.
    pub fn value_as_cells(&self) -> Result<Vec<u32>, PropertyError> {
        decode_all::<u32, BigEndian32>(&self.data).ok_or(PropertyError::InvalidPropFormat)
    }

    /// The first string of the payload.
    pub fn value_as_str(&self) -> Result<&str, PropertyError> {
        self.string_at(0)
    }

    pub fn value_as_strlist(&self) -> Result<Vec<&str>, PropertyError> {
        let slice = self.data.as_ref();
        let mut st = 0;
        let mut res = Vec::new();
        for (i, byte) in slice.iter().enumerate() {
            if *byte == 0 {
                res.push(Self::decode_str(&slice[st..i])?);
                st = i + 1;
            }
        }
        // last entry may not be terminated with 0
        if st != slice.len() {
            res.push(Self::decode_str(&slice[st..])?);
        }
        Ok(res)
    }

    pub fn count_strings(&self) -> Result<usize, PropertyError> {
        Ok(self.value_as_strlist()?.len())
    }

    pub fn string_at(&self, index: usize) -> Result<&str, PropertyError> {
        self.value_as_strlist()?
            .get(index)
            .copied()
            .ok_or(PropertyError::IndexOutOfRange)
    }

    fn decode_str(bytes: &[u8]) -> Result<&str, PropertyError> {
        str::from_utf8(bytes).map_err(|_| PropertyError::InvalidPropFormat)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PropertyError {
    InvalidPropFormat,
    PropNotFound,
    DanglingHandle,
    IndexOutOfRange,
}

impl fmt::Display for PropertyError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PropertyError::InvalidPropFormat => f.write_str("malformed property value"),
            PropertyError::PropNotFound => f.write_str("property not found"),
            PropertyError::DanglingHandle => f.write_str("phandle does not name any node"),
            PropertyError::IndexOutOfRange => f.write_str("index past the end of the property"),
        }
    }
}

impl core::error::Error for PropertyError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strlist_handles_missing_terminator() {
        let prop = Property::new("dma-names", b"tx_channel\0rx_channel".to_vec());
        assert_eq!(prop.value_as_strlist().unwrap(), ["tx_channel", "rx_channel"]);
        assert_eq!(prop.count_strings().unwrap(), 2);
        assert_eq!(prop.string_at(1).unwrap(), "rx_channel");
        assert_eq!(prop.string_at(2), Err(PropertyError::IndexOutOfRange));
    }

    #[test]
    fn compatible_reads_first_entry() {
        let prop = Property::from_strlist("compatible", &["s2mm-dma", "generic-dma"]);
        assert_eq!(prop.value_as_str().unwrap(), "s2mm-dma");
    }

    #[test]
    fn invalid_utf8_is_a_format_error() {
        let prop = Property::new("label", vec![0xff, 0xfe, 0]);
        assert_eq!(prop.value_as_str(), Err(PropertyError::InvalidPropFormat));
    }

    #[test]
    fn cells_require_whole_words() {
        let prop = Property::from_cells("dmas", &[1, 0, 2, 1]);
        assert_eq!(prop.value_as_cells().unwrap(), [1, 0, 2, 1]);
        assert_eq!(prop.value_as_u32().unwrap(), 1);
        let prop = Property::new("dmas", vec![0, 0, 0, 1, 0]);
        assert_eq!(prop.value_as_cells(), Err(PropertyError::InvalidPropFormat));
        assert_eq!(Property::empty("x").value_as_u32(), Err(PropertyError::InvalidPropFormat));
    }
}
