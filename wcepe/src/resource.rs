//! Walking the resource directory tree.
//!
//! All offsets within the tree are relative to the file offset of the root directory. The high
//! bit of an entry's value distinguishes subdirectories (set) from data entries (clear); the high
//! bit of an entry's name distinguishes string names (set) from integer IDs (clear).


use std::collections::BTreeSet;

use tracing::{debug, trace};

use crate::{ByteSource, Error, TextDecoder, TreeViolation};
use crate::pe::{Headers, KnownDataDirectoryEntry};


/// The resource type ID of version information resources.
pub const RT_VERSION: u32 = 16;

/// How many directory levels below the root the walker descends by default.
pub const DEFAULT_MAX_RESOURCE_DEPTH: usize = 8;

const HIGH_BIT: u32 = 0x8000_0000;
const DIRECTORY_HEADER_SIZE: usize = 16;
const DIRECTORY_ENTRY_SIZE: usize = 8;
const DATA_ENTRY_SIZE: usize = 16;


#[derive(Clone, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub enum ResourceIdentifier {
    Name(String), // name_offset: u32 -> Pascal UTF-16LE string
    Integer(u32),
}

#[derive(Clone, Copy, Debug, Default, Eq, Hash, Ord, PartialEq, PartialOrd)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub struct ResourceDirectoryHeader {
    pub characteristics: u32,
    pub timestamp: u32,
    pub major_version: u16,
    pub minor_version: u16,
    pub name_entry_count: u16,
    pub id_entry_count: u16,
}
impl ResourceDirectoryHeader {
    fn from_bytes(header_buf: &[u8; DIRECTORY_HEADER_SIZE]) -> Self {
        Self {
            characteristics: u32::from_le_bytes([header_buf[0], header_buf[1], header_buf[2], header_buf[3]]),
            timestamp: u32::from_le_bytes([header_buf[4], header_buf[5], header_buf[6], header_buf[7]]),
            major_version: u16::from_le_bytes([header_buf[8], header_buf[9]]),
            minor_version: u16::from_le_bytes([header_buf[10], header_buf[11]]),
            name_entry_count: u16::from_le_bytes([header_buf[12], header_buf[13]]),
            id_entry_count: u16::from_le_bytes([header_buf[14], header_buf[15]]),
        }
    }

    pub fn entry_count(&self) -> usize {
        usize::from(self.name_entry_count) + usize::from(self.id_entry_count)
    }
}

#[derive(Clone, Copy, Debug, Default, Eq, Hash, Ord, PartialEq, PartialOrd)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub struct ResourceDataEntry {
    pub data_rva: u32,
    pub size: u32,
    pub codepage: u32,
    pub reserved: u32,
}
impl ResourceDataEntry {
    fn from_bytes(entry_buf: &[u8; DATA_ENTRY_SIZE]) -> Self {
        Self {
            data_rva: u32::from_le_bytes([entry_buf[0], entry_buf[1], entry_buf[2], entry_buf[3]]),
            size: u32::from_le_bytes([entry_buf[4], entry_buf[5], entry_buf[6], entry_buf[7]]),
            codepage: u32::from_le_bytes([entry_buf[8], entry_buf[9], entry_buf[10], entry_buf[11]]),
            reserved: u32::from_le_bytes([entry_buf[12], entry_buf[13], entry_buf[14], entry_buf[15]]),
        }
    }
}

/// A data entry found by the walker along with the identifiers leading to it from the root.
#[derive(Clone, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub struct ResourceLeaf {
    pub path: Vec<ResourceIdentifier>,
    pub entry: ResourceDataEntry,
}


/// Selects the version information subtree: only [`RT_VERSION`] at the type level, anything
/// below it.
pub fn version_predicate(level: usize, identifier: &ResourceIdentifier) -> bool {
    level > 0 || *identifier == ResourceIdentifier::Integer(RT_VERSION)
}


/// Recursive descent over a resource directory tree.
pub struct ResourceWalker<'a, S: ByteSource + ?Sized, D: TextDecoder + ?Sized> {
    source: &'a S,
    decoder: &'a D,
    root_offset: u64,
}
impl<'a, S: ByteSource + ?Sized, D: TextDecoder + ?Sized> ResourceWalker<'a, S, D> {
    /// Creates a walker for the tree whose root directory is at the given file offset.
    pub fn new(source: &'a S, decoder: &'a D, root_offset: u64) -> Self {
        Self {
            source,
            decoder,
            root_offset,
        }
    }

    /// Creates a walker for the resource directory of the image.
    ///
    /// Returns `Ok(None)` if the image has no resource directory or if it is not mapped by any
    /// section.
    pub fn from_headers(source: &'a S, decoder: &'a D, headers: &Headers) -> Result<Option<Self>, Error> {
        let directory = headers.data_directory(KnownDataDirectoryEntry::ResourceTable);
        if directory.is_empty() {
            debug!("image has no resource directory");
            return Ok(None);
        }

        match headers.resolver().resolve(directory.address) {
            Ok(root_offset) => {
                debug!("resource directory at RVA {:#010X} is at file offset {:#X}", directory.address, root_offset);
                Ok(Some(Self::new(source, decoder, root_offset)))
            },
            Err(Error::NotMapped { rva }) => {
                debug!("resource directory RVA {:#010X} is not mapped by any section", rva);
                Ok(None)
            },
            Err(e) => Err(e),
        }
    }

    pub fn root_offset(&self) -> u64 {
        self.root_offset
    }

    /// Collects every data entry reachable through entries accepted by the predicate.
    ///
    /// The predicate receives the level of the directory containing the entry (0 for the root)
    /// and the entry's identifier. Directories more than `max_depth` levels below the root are
    /// refused.
    pub fn find<P: FnMut(usize, &ResourceIdentifier) -> bool>(&self, mut predicate: P, max_depth: usize) -> Result<Vec<ResourceLeaf>, Error> {
        let mut leaves = Vec::new();
        let mut ancestors = vec![self.root_offset];
        let mut visited = BTreeSet::new();
        visited.insert(self.root_offset);
        let mut path = Vec::new();

        self.walk_directory(
            self.root_offset,
            0,
            max_depth,
            &mut predicate,
            &mut ancestors,
            &mut visited,
            &mut path,
            &mut leaves,
        )?;
        Ok(leaves)
    }

    fn walk_directory<P: FnMut(usize, &ResourceIdentifier) -> bool>(
        &self,
        directory_offset: u64,
        level: usize,
        max_depth: usize,
        predicate: &mut P,
        ancestors: &mut Vec<u64>,
        visited: &mut BTreeSet<u64>,
        path: &mut Vec<ResourceIdentifier>,
        leaves: &mut Vec<ResourceLeaf>,
    ) -> Result<(), Error> {
        let header_buf: [u8; DIRECTORY_HEADER_SIZE] = self.source.read_array(directory_offset)?;
        let header = ResourceDirectoryHeader::from_bytes(&header_buf);
        trace!(
            "directory at {:#X} (level {}): {} named, {} numbered entries",
            directory_offset, level, header.name_entry_count, header.id_entry_count,
        );

        let entries_offset = directory_offset + DIRECTORY_HEADER_SIZE as u64;
        let entry_bytes = self.source.read_exact(entries_offset, header.entry_count() * DIRECTORY_ENTRY_SIZE)?;

        for (index, entry) in entry_bytes.chunks_exact(DIRECTORY_ENTRY_SIZE).enumerate() {
            let name_field = u32::from_le_bytes([entry[0], entry[1], entry[2], entry[3]]);
            let value_field = u32::from_le_bytes([entry[4], entry[5], entry[6], entry[7]]);

            let identifier = if index < usize::from(header.name_entry_count) && name_field & HIGH_BIT == 0 {
                debug!("named resource entry at level {} has name field {:#010X} without top bit set", level, name_field);
                ResourceIdentifier::Integer(name_field)
            } else if name_field & HIGH_BIT != 0 {
                match self.read_name(self.root_offset + u64::from(name_field & !HIGH_BIT)) {
                    Ok(identifier) => identifier,
                    Err(e) => {
                        debug!("skipping resource entry at level {} with unreadable name {:#010X}: {}", level, name_field, e);
                        continue;
                    },
                }
            } else {
                ResourceIdentifier::Integer(name_field)
            };

            if !predicate(level, &identifier) {
                trace!("skipping resource entry {:?} at level {}", identifier, level);
                continue;
            }

            let child_offset = self.root_offset + u64::from(value_field & !HIGH_BIT);
            path.push(identifier);
            if value_field & HIGH_BIT != 0 {
                self.check_subdirectory(child_offset, level + 1, max_depth, ancestors, visited)?;
                ancestors.push(child_offset);
                visited.insert(child_offset);
                self.walk_directory(child_offset, level + 1, max_depth, predicate, ancestors, visited, path, leaves)?;
                ancestors.pop();
            } else {
                let data_entry_buf: [u8; DATA_ENTRY_SIZE] = self.source.read_array(child_offset)?;
                let data_entry = ResourceDataEntry::from_bytes(&data_entry_buf);
                debug!(
                    "resource leaf {:?}: RVA {:#010X}, {} bytes, codepage {}",
                    path, data_entry.data_rva, data_entry.size, data_entry.codepage,
                );
                leaves.push(ResourceLeaf {
                    path: path.clone(),
                    entry: data_entry,
                });
            }
            path.pop();
        }

        Ok(())
    }

    fn check_subdirectory(&self, child_offset: u64, child_level: usize, max_depth: usize, ancestors: &[u64], visited: &BTreeSet<u64>) -> Result<(), Error> {
        if child_level > max_depth {
            return Err(Error::MalformedResourceTree {
                offset: child_offset,
                violation: TreeViolation::DepthExceeded { max_depth },
            });
        }
        if let Some(&ancestor_offset) = ancestors.iter().find(|&&ancestor| child_offset <= ancestor) {
            return Err(Error::MalformedResourceTree {
                offset: child_offset,
                violation: TreeViolation::OffsetNotIncreasing { ancestor_offset },
            });
        }
        if visited.contains(&child_offset) {
            return Err(Error::MalformedResourceTree {
                offset: child_offset,
                violation: TreeViolation::Revisited,
            });
        }
        Ok(())
    }

    fn read_name(&self, name_offset: u64) -> Result<ResourceIdentifier, Error> {
        let char_count = self.source.read_u16_le(name_offset)?;
        let name_bytes = self.source.read_exact(name_offset + 2, usize::from(char_count) * 2)?;
        Ok(ResourceIdentifier::Name(self.decoder.utf16_to_text(&name_bytes)))
    }
}
