use alloc::{boxed::Box, vec::Vec};
use core::{error::Error, fmt, ops::Range};
use dt::prop::PropertyError;

/// Identity of a process or thread asking for the device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct CallerId(pub u64);

impl fmt::Display for CallerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "caller {}", self.0)
    }
}

/// Failures while reading the channel topology. Any of them aborts the attach.
///
/// `node` is always the full path of the node the problem was found on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TopologyError {
    MissingProperty {
        property: &'static str,
        node: Box<str>,
    },
    EmptyProperty {
        property: &'static str,
        node: Box<str>,
    },
    LengthMismatch {
        names: usize,
        references: usize,
        node: Box<str>,
    },
    MalformedProperty {
        property: &'static str,
        node: Box<str>,
        cause: PropertyError,
    },
    /// The reference at `index` does not carry exactly one selector of 0 or 1.
    InvalidArgument {
        index: usize,
        args: Vec<u32>,
        node: Box<str>,
    },
    /// A DMA core node without the sub-channel the selector asked for.
    InvalidTopology {
        node: Box<str>,
        children: usize,
        selector: u32,
    },
    UnknownChannelType {
        node: Box<str>,
        tag: Option<Box<str>>,
    },
    IndexOutOfRange {
        index: usize,
        len: usize,
    },
}

impl fmt::Display for TopologyError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TopologyError::MissingProperty { property, node } => {
                write!(f, "{}: missing property '{}'", node, property)
            }
            TopologyError::EmptyProperty { property, node } => {
                write!(f, "{}: property '{}' is empty", node, property)
            }
            TopologyError::LengthMismatch {
                names,
                references,
                node,
            } => write!(
                f,
                "{}: {} channel names but {} channel references",
                node, names, references
            ),
            TopologyError::MalformedProperty {
                property,
                node,
                cause,
            } => write!(f, "{}: property '{}': {}", node, property, cause),
            TopologyError::InvalidArgument { index, args, node } => write!(
                f,
                "{}: channel {} has selector {:?}, expected a single 0 or 1",
                node, index, args
            ),
            TopologyError::InvalidTopology {
                node,
                children,
                selector,
            } => write!(
                f,
                "{}: {} sub-channel nodes, cannot select sub-channel {}",
                node, children, selector
            ),
            TopologyError::UnknownChannelType { node, tag: Some(tag) } => {
                write!(f, "{}: unknown channel type '{}'", node, tag)
            }
            TopologyError::UnknownChannelType { node, tag: None } => {
                write!(f, "{}: channel type is missing", node)
            }
            TopologyError::IndexOutOfRange { index, len } => {
                write!(f, "channel index {} out of range for {} channels", index, len)
            }
        }
    }
}

impl Error for TopologyError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            TopologyError::MalformedProperty { cause, .. } => Some(cause),
            _ => None,
        }
    }
}

/// Failures of a single session call. The device keeps its previous state.
#[derive(Debug)]
pub enum SessionError {
    PermissionDenied {
        caller: CallerId,
    },
    /// The caller did not ask for exclusive access.
    InvalidRequest {
        caller: CallerId,
    },
    AlreadyOpen {
        holder: CallerId,
    },
    /// The token is stale, foreign, or its session has been released.
    InvalidSession,
    OutOfRange {
        offset: usize,
        length: usize,
        buffer_length: usize,
    },
    MapFailed {
        range: Range<usize>,
        cause: Box<dyn Error + Send + Sync>,
    },
    /// Detach while a session is still live.
    Busy {
        holder: CallerId,
    },
    NotAttached,
}

impl fmt::Display for SessionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionError::PermissionDenied { caller } => {
                write!(f, "{} lacks the privilege to open the device", caller)
            }
            SessionError::InvalidRequest { caller } => {
                write!(f, "{} must request exclusive access", caller)
            }
            SessionError::AlreadyOpen { holder } => {
                write!(f, "device is already opened by {}", holder)
            }
            SessionError::InvalidSession => f.write_str("session is not live"),
            SessionError::OutOfRange {
                offset,
                length,
                buffer_length,
            } => write!(
                f,
                "range {:#x}+{:#x} exceeds the {:#x} byte buffer",
                offset, length, buffer_length
            ),
            SessionError::MapFailed { range, cause } => {
                write!(f, "mapping {:#x?} failed: {}", range, cause)
            }
            SessionError::Busy { holder } => write!(f, "device is still held by {}", holder),
            SessionError::NotAttached => f.write_str("device is not attached"),
        }
    }
}

impl Error for SessionError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            SessionError::MapFailed { cause, .. } => Some(cause.as_ref()),
            _ => None,
        }
    }
}

/// The mapper returned a start address whose mapping would wrap the address space.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MapOverflow {
    pub virt: usize,
    pub length: usize,
}

impl fmt::Display for MapOverflow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#x}+{:#x} wraps the address space", self.virt, self.length)
    }
}

impl Error for MapOverflow {}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttachError {
    Topology(TopologyError),
    AlreadyAttached,
}

impl From<TopologyError> for AttachError {
    fn from(value: TopologyError) -> Self {
        AttachError::Topology(value)
    }
}

impl fmt::Display for AttachError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AttachError::Topology(err) => write!(f, "invalid channel topology: {}", err),
            AttachError::AlreadyAttached => f.write_str("a device is already attached"),
        }
    }
}

impl Error for AttachError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            AttachError::Topology(err) => Some(err),
            AttachError::AlreadyAttached => None,
        }
    }
}
