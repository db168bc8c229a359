use std::fmt;


/// The header invariant that failed to hold.
#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub enum HeaderCheck {
    /// The four bytes at the COFF pointer are not `PE\0\0`.
    Signature { found: u32 },

    /// The optional header magic is not PE32.
    OptionalMagic { found: u16 },

    /// The optional header does not have the size of a PE32 optional header.
    OptionalHeaderSize { found: u16 },
}
impl fmt::Display for HeaderCheck {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Signature { found }
                => write!(f, "PE signature mismatch (found {:#010X})", found),
            Self::OptionalMagic { found }
                => write!(f, "optional header magic is {:#06X}, expected PE32 ({:#06X})", found, crate::pe::PE32_MAGIC),
            Self::OptionalHeaderSize { found }
                => write!(
                    f,
                    "optional header size is {}, expected {} (PE32+ images are not supported)",
                    found, crate::pe::PE32_OPTIONAL_HEADER_SIZE,
                ),
        }
    }
}

/// The way in which a resource directory tree was found to be malformed.
#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub enum TreeViolation {
    /// The tree is deeper than the walker is allowed to descend.
    DepthExceeded { max_depth: usize },

    /// A subdirectory does not lie beyond the directory that references it or one of its
    /// ancestors.
    OffsetNotIncreasing { ancestor_offset: u64 },

    /// A subdirectory has already been walked through a different entry.
    Revisited,
}
impl fmt::Display for TreeViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::DepthExceeded { max_depth }
                => write!(f, "tree is deeper than {} levels", max_depth),
            Self::OffsetNotIncreasing { ancestor_offset }
                => write!(f, "subdirectory does not lie beyond ancestor at {:#X}", ancestor_offset),
            Self::Revisited
                => write!(f, "subdirectory has already been visited"),
        }
    }
}

#[derive(Debug)]
pub enum Error {
    Io(std::io::Error),
    OutOfBounds { offset: u64, length: u64, image_size: u64 },
    Unterminated { offset: u64, max_length: usize },
    MalformedHeader { check: HeaderCheck, offset: u64 },
    NotMapped { rva: u32 },
    UnexpectedKey { offset: u64, found: String },
    LengthMismatch { offset: u64, declared: u64, available: u64 },
    MalformedResourceTree { offset: u64, violation: TreeViolation },
}
impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Io(e)
                => write!(f, "I/O error: {}", e),
            Self::OutOfBounds { offset, length, image_size }
                => write!(f, "reading {} bytes at {:#X} crosses the end of the {}-byte image", length, offset, image_size),
            Self::Unterminated { offset, max_length }
                => write!(f, "string at {:#X} is not terminated within {} bytes", offset, max_length),
            Self::MalformedHeader { check, offset }
                => write!(f, "malformed header at {:#X}: {}", offset, check),
            Self::NotMapped { rva }
                => write!(f, "RVA {:#010X} is not mapped by any section", rva),
            Self::UnexpectedKey { offset, found }
                => write!(f, "unexpected version info key {:?} at {:#X}", found, offset),
            Self::LengthMismatch { offset, declared, available }
                => write!(f, "record at {:#X} declares {} bytes but only {} are available", offset, declared, available),
            Self::MalformedResourceTree { offset, violation }
                => write!(f, "malformed resource tree at {:#X}: {}", offset, violation),
        }
    }
}
impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io(e) => Some(e),
            Self::OutOfBounds { .. } => None,
            Self::Unterminated { .. } => None,
            Self::MalformedHeader { .. } => None,
            Self::NotMapped { .. } => None,
            Self::UnexpectedKey { .. } => None,
            Self::LengthMismatch { .. } => None,
            Self::MalformedResourceTree { .. } => None,
        }
    }
}
impl From<std::io::Error> for Error {
    fn from(value: std::io::Error) -> Self { Self::Io(value) }
}
