//! Decoding of `VS_VERSIONINFO` resources.
//!
//! A version resource is a tree of records, each consisting of:
//!
//! * `wLength`: the length of the record including its children
//! * `wValueLength`: the length of the value (in 16-bit words for text values)
//! * `wType`: 1 for text values, 0 for binary values
//! * the key as a NUL-terminated UTF-16 string
//! * padding to a 4-byte boundary, then the value
//! * padding to a 4-byte boundary, then the children
//!
//! Padding is computed relative to the start of the `VS_VERSION_INFO` record.


use std::collections::BTreeMap;

use tracing::{debug, warn};

use crate::{align4, ByteSource, Error, TextDecoder};
use crate::resource::ResourceDataEntry;
use crate::rva::AddressResolver;


pub const ROOT_KEY: &str = "VS_VERSION_INFO";
pub const STRING_FILE_INFO_KEY: &str = "StringFileInfo";
pub const VAR_FILE_INFO_KEY: &str = "VarFileInfo";
pub const FIXED_FILE_INFO_SIGNATURE: u32 = 0xFEEF_04BD;
pub const FIXED_FILE_INFO_SIZE: usize = 52;

const RECORD_HEADER_SIZE: u64 = 6;


#[derive(Clone, Copy, Debug, Default, Eq, Hash, Ord, PartialEq, PartialOrd)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub struct FixedFileInfo {
    pub signature: u32,
    pub struct_version: u32,
    pub file_version_ms: u32,
    pub file_version_ls: u32,
    pub product_version_ms: u32,
    pub product_version_ls: u32,
    pub file_flags_mask: u32,
    pub file_flags: u32,
    pub file_os: u32,
    pub file_type: u32,
    pub file_subtype: u32,
    pub file_date_ms: u32,
    pub file_date_ls: u32,
}
impl FixedFileInfo {
    pub fn from_bytes(buf: &[u8; FIXED_FILE_INFO_SIZE]) -> Self {
        let field = |index: usize| u32::from_le_bytes([buf[4*index], buf[4*index+1], buf[4*index+2], buf[4*index+3]]);
        Self {
            signature: field(0),
            struct_version: field(1),
            file_version_ms: field(2),
            file_version_ls: field(3),
            product_version_ms: field(4),
            product_version_ls: field(5),
            file_flags_mask: field(6),
            file_flags: field(7),
            file_os: field(8),
            file_type: field(9),
            file_subtype: field(10),
            file_date_ms: field(11),
            file_date_ls: field(12),
        }
    }

    pub fn has_valid_signature(&self) -> bool {
        self.signature == FIXED_FILE_INFO_SIGNATURE
    }

    /// The file version in dotted `a.b.c.d` notation.
    pub fn file_version(&self) -> String {
        dotted_version(self.file_version_ms, self.file_version_ls)
    }

    /// The product version in dotted `a.b.c.d` notation.
    pub fn product_version(&self) -> String {
        dotted_version(self.product_version_ms, self.product_version_ls)
    }
}

fn dotted_version(ms: u32, ls: u32) -> String {
    format!("{}.{}.{}.{}", ms >> 16, ms & 0xFFFF, ls >> 16, ls & 0xFFFF)
}

/// The strings of one language and codepage.
#[derive(Clone, Debug, Default, Eq, Hash, Ord, PartialEq, PartialOrd)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub struct StringTable {
    /// Eight hexadecimal digits: the language ID followed by the codepage.
    pub key: String,
    pub strings: Vec<(String, String)>,
}
impl StringTable {
    /// The language ID and codepage encoded in the key, if it is well-formed.
    pub fn language_and_codepage(&self) -> Option<(u16, u16)> {
        if self.key.len() != 8 || !self.key.is_char_boundary(4) {
            return None;
        }
        let language = u16::from_str_radix(&self.key[0..4], 16).ok()?;
        let codepage = u16::from_str_radix(&self.key[4..8], 16).ok()?;
        Some((language, codepage))
    }
}

#[derive(Clone, Debug, Default, Eq, Hash, Ord, PartialEq, PartialOrd)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub struct VersionInfo {
    /// The fixed file info, if the value was large enough to contain one.
    pub fixed_file_info: Option<FixedFileInfo>,

    /// The value length declared by the root record; 0 if there is no fixed file info.
    pub fixed_file_info_length: u16,

    pub string_tables: Vec<StringTable>,
}
impl VersionInfo {
    /// All strings of all tables. Where multiple tables define the same name, the last one wins.
    pub fn fields(&self) -> BTreeMap<String, String> {
        let mut ret = BTreeMap::new();
        for table in &self.string_tables {
            for (name, value) in &table.strings {
                ret.insert(name.clone(), value.clone());
            }
        }
        ret
    }
}


/// The fixed part of a record along with the positions derived from it.
#[derive(Clone, Debug)]
struct RecordHeader {
    offset: u64,
    value_length: u16,
    key: String,
    value_offset: u64,
    end: u64,
}


/// Decodes one `VS_VERSIONINFO` region.
pub struct VersionInfoDecoder<'a, S: ByteSource + ?Sized, D: TextDecoder + ?Sized> {
    source: &'a S,
    decoder: &'a D,
    start: u64,
    size: u64,
}
impl<'a, S: ByteSource + ?Sized, D: TextDecoder + ?Sized> VersionInfoDecoder<'a, S, D> {
    /// Prepares decoding the region of `size` bytes at file offset `start`. The size is clamped
    /// to the image.
    pub fn new(source: &'a S, decoder: &'a D, start: u64, size: u64) -> Self {
        let size = size.min(source.remaining_from(start));
        Self {
            source,
            decoder,
            start,
            size,
        }
    }

    /// Prepares decoding the data of a resource leaf.
    pub fn from_resource(source: &'a S, decoder: &'a D, entry: &ResourceDataEntry, resolver: &AddressResolver<'_>) -> Result<Self, Error> {
        let start = resolver.resolve(entry.data_rva)?;
        debug!("version info at RVA {:#010X} is at file offset {:#X} ({} bytes)", entry.data_rva, start, entry.size);
        Ok(Self::new(source, decoder, start, entry.size.into()))
    }

    fn align(&self, offset: u64) -> u64 {
        align4(self.start, offset)
    }

    pub fn decode(&self) -> Result<VersionInfo, Error> {
        let region_end = self.start + self.size;
        let root = self.read_record_header(self.start, region_end, true)?;
        if root.key != ROOT_KEY {
            return Err(Error::UnexpectedKey { offset: root.offset, found: root.key });
        }

        let mut position = root.value_offset;
        let mut fixed_file_info = None;
        if root.value_length > 0 {
            let available = root.end.saturating_sub(position);
            let length = u64::from(root.value_length).min(available);
            if length != FIXED_FILE_INFO_SIZE as u64 {
                warn!(
                    "fixed file info at {:#X} is {} bytes long (declared {}), expected {}",
                    position, length, root.value_length, FIXED_FILE_INFO_SIZE,
                );
            }
            if length >= FIXED_FILE_INFO_SIZE as u64 {
                let buf: [u8; FIXED_FILE_INFO_SIZE] = self.source.read_array(position)?;
                let info = FixedFileInfo::from_bytes(&buf);
                if !info.has_valid_signature() {
                    warn!("fixed file info at {:#X} has signature {:#010X}", position, info.signature);
                }
                fixed_file_info = Some(info);
            }
            position += length;
        }
        position = self.align(position);

        let mut string_tables = Vec::new();
        while position < root.end {
            let child = self.read_record_header(position, root.end, false)?;
            if child.key == STRING_FILE_INFO_KEY {
                self.read_string_file_info(&child, &mut string_tables)?;
            } else if child.key == VAR_FILE_INFO_KEY {
                debug!("skipping {} at {:#X}", VAR_FILE_INFO_KEY, child.offset);
            } else {
                return Err(Error::UnexpectedKey { offset: child.offset, found: child.key });
            }
            position = self.align(child.end);
        }

        Ok(VersionInfo {
            fixed_file_info,
            fixed_file_info_length: root.value_length,
            string_tables,
        })
    }

    fn read_string_file_info(&self, string_file_info: &RecordHeader, string_tables: &mut Vec<StringTable>) -> Result<(), Error> {
        let mut position = self.align(string_file_info.value_offset);
        while position < string_file_info.end {
            let table = self.read_record_header(position, string_file_info.end, false)?;
            let mut strings = Vec::new();

            let mut string_position = self.align(table.value_offset);
            while string_position < table.end {
                let string = self.read_record_header(string_position, table.end, false)?;
                if string.value_length > 0 {
                    let value = self.read_string_value(&string)?;
                    strings.push((string.key, value));
                } else {
                    debug!("string {:?} at {:#X} has no value", string.key, string.offset);
                }
                string_position = self.align(string.end);
            }

            debug!("string table {:?} at {:#X} has {} strings", table.key, table.offset, strings.len());
            string_tables.push(StringTable {
                key: table.key,
                strings,
            });
            position = self.align(table.end);
        }
        Ok(())
    }

    fn read_string_value(&self, string: &RecordHeader) -> Result<String, Error> {
        if string.value_offset >= string.end {
            debug!("string {:?} at {:#X} has no room for its value", string.key, string.offset);
            return Ok(String::new());
        }
        let bounded_length = (string.end - string.value_offset) & !1;
        let mut bytes = self.source.read_exact(string.value_offset, bounded_length as usize)?;
        if let Some(nul_index) = bytes.chunks_exact(2).position(|unit| unit == [0x00, 0x00]) {
            bytes.truncate(nul_index * 2);
        }
        Ok(self.decoder.utf16_to_text(&bytes))
    }

    /// Reads the header and key of the record at `offset`.
    ///
    /// The root record is clamped to the region; any other record must fit into its parent.
    fn read_record_header(&self, offset: u64, parent_end: u64, is_root: bool) -> Result<RecordHeader, Error> {
        let available = parent_end.saturating_sub(offset);
        if available < RECORD_HEADER_SIZE {
            return Err(Error::LengthMismatch { offset, declared: RECORD_HEADER_SIZE, available });
        }

        let header_buf: [u8; RECORD_HEADER_SIZE as usize] = self.source.read_array(offset)?;
        let total_length = u64::from(u16::from_le_bytes([header_buf[0], header_buf[1]]));
        let value_length = u16::from_le_bytes([header_buf[2], header_buf[3]]);

        if total_length < RECORD_HEADER_SIZE || (!is_root && total_length > available) {
            debug!("record at {:#X} declares {} bytes, {} available", offset, total_length, available);
            return Err(Error::LengthMismatch { offset, declared: total_length, available });
        }
        let end = offset + total_length.min(available);

        let key_offset = offset + RECORD_HEADER_SIZE;
        // end - key_offset is at most a u16 length
        let key_bytes = self.source.read_utf16_cstring_bounded(key_offset, (end - key_offset) as usize)?;
        let key = self.decoder.utf16_to_text(&key_bytes);
        let value_offset = self.align(key_offset + key_bytes.len() as u64 + 2);

        Ok(RecordHeader {
            offset,
            value_length,
            key,
            value_offset,
            end,
        })
    }
}
