//! Decoding of the import directory.


use tracing::{debug, trace};

use crate::{ByteSource, Error, TextDecoder};
use crate::pe::DataDirectoryEntry;
use crate::rva::AddressResolver;


/// The longest module or symbol name read, including its terminator.
pub const MAX_IMPORT_NAME_LENGTH: usize = 256;

pub const IMPORT_DESCRIPTOR_SIZE: u32 = 20;

/// Set in a thunk if the symbol is imported by ordinal.
pub const ORDINAL_FLAG: u32 = 0x8000_0000;


#[derive(Clone, Copy, Debug, Default, Eq, Hash, Ord, PartialEq, PartialOrd)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub struct ImportDescriptor {
    /// RVA of the import lookup table; 0 in images from some older linkers.
    pub original_first_thunk: u32,
    pub time_date_stamp: u32,
    pub forwarder_chain: u32,
    pub name_rva: u32,
    /// RVA of the import address table.
    pub first_thunk: u32,
}
impl ImportDescriptor {
    fn from_bytes(buf: &[u8; IMPORT_DESCRIPTOR_SIZE as usize]) -> Self {
        let field = |index: usize| u32::from_le_bytes([buf[4*index], buf[4*index+1], buf[4*index+2], buf[4*index+3]]);
        Self {
            original_first_thunk: field(0),
            time_date_stamp: field(1),
            forwarder_chain: field(2),
            name_rva: field(3),
            first_thunk: field(4),
        }
    }

    pub fn is_terminator(&self) -> bool {
        *self == Self::default()
    }

    /// The RVA of the thunk array to decode: the lookup table if there is one, otherwise the
    /// address table.
    pub fn thunk_rva(&self) -> u32 {
        if self.original_first_thunk != 0 {
            self.original_first_thunk
        } else {
            self.first_thunk
        }
    }
}

/// A symbol imported from a module; serialized as either the bare ordinal or the bare name.
#[derive(Clone, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
#[cfg_attr(feature = "serde", serde(untagged))]
pub enum ImportedSymbol {
    ByOrdinal(u16),
    ByName(String),
}

#[derive(Clone, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub struct ImportedModule {
    pub name: String,
    pub descriptor: ImportDescriptor,
    pub symbols: Vec<ImportedSymbol>,
}


pub struct ImportTableDecoder<'a, S: ByteSource + ?Sized, D: TextDecoder + ?Sized> {
    source: &'a S,
    decoder: &'a D,
    resolver: AddressResolver<'a>,
}
impl<'a, S: ByteSource + ?Sized, D: TextDecoder + ?Sized> ImportTableDecoder<'a, S, D> {
    pub fn new(source: &'a S, decoder: &'a D, resolver: AddressResolver<'a>) -> Self {
        Self {
            source,
            decoder,
            resolver,
        }
    }

    /// Decodes the modules listed in the import directory.
    ///
    /// Returns `Ok(None)` if the directory is empty or not mapped by any section.
    pub fn decode(&self, directory: &DataDirectoryEntry) -> Result<Option<Vec<ImportedModule>>, Error> {
        if directory.is_empty() {
            debug!("image has no import directory");
            return Ok(None);
        }
        let directory_offset = match self.resolver.resolve(directory.address) {
            Ok(offset) => offset,
            Err(Error::NotMapped { rva }) => {
                debug!("import directory RVA {:#010X} is not mapped by any section", rva);
                return Ok(None);
            },
            Err(e) => return Err(e),
        };

        let max_descriptors = directory.size / IMPORT_DESCRIPTOR_SIZE;
        let mut modules = Vec::new();
        for i in 0..max_descriptors {
            let descriptor_offset = directory_offset + u64::from(i * IMPORT_DESCRIPTOR_SIZE);
            let descriptor_buf: [u8; IMPORT_DESCRIPTOR_SIZE as usize] = self.source.read_array(descriptor_offset)?;
            let descriptor = ImportDescriptor::from_bytes(&descriptor_buf);
            if descriptor.is_terminator() {
                debug!("import descriptor array ends at index {}", i);
                break;
            }

            let name = self.read_name(descriptor.name_rva)?;
            debug!("module {:?} imports through thunks at RVA {:#010X}", name, descriptor.thunk_rva());
            let symbols = self.read_thunks(descriptor.thunk_rva())?;
            modules.push(ImportedModule {
                name,
                descriptor,
                symbols,
            });
        }
        Ok(Some(modules))
    }

    fn read_name(&self, rva: u32) -> Result<String, Error> {
        let offset = self.resolver.resolve(rva)?;
        let bytes = self.source.read_cstring_bounded(offset, MAX_IMPORT_NAME_LENGTH)?;
        Ok(self.decoder.ascii_to_text(&bytes))
    }

    fn read_thunks(&self, thunk_rva: u32) -> Result<Vec<ImportedSymbol>, Error> {
        let thunks_offset = self.resolver.resolve(thunk_rva)?;
        let mut symbols = Vec::new();
        for thunk_offset in (thunks_offset..).step_by(4) {
            let thunk = self.source.read_u32_le(thunk_offset)?;
            if thunk == 0 {
                break;
            }

            if thunk & ORDINAL_FLAG != 0 {
                let ordinal = (thunk & 0xFFFF) as u16;
                trace!("  ordinal {}", ordinal);
                symbols.push(ImportedSymbol::ByOrdinal(ordinal));
            } else {
                // skip the hint
                let name = self.read_name(thunk + 2)?;
                if name.is_empty() {
                    debug!("skipping thunk {:#010X} with empty name", thunk);
                    continue;
                }
                trace!("  name {:?}", name);
                symbols.push(ImportedSymbol::ByName(name));
            }
        }
        Ok(symbols)
    }
}
