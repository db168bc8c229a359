//! Translation of relative virtual addresses into file offsets.

use crate::Error;
use crate::pe::Section;


/// Maps RVAs to file offsets using a section table.
///
/// Sections are consulted in table order and the first section whose virtual range contains the
/// RVA wins; overlapping sections are not an error.
#[derive(Clone, Copy, Debug)]
pub struct AddressResolver<'a> {
    sections: &'a [Section],
}
impl<'a> AddressResolver<'a> {
    pub fn new(sections: &'a [Section]) -> Self {
        Self {
            sections,
        }
    }

    pub fn section_containing(&self, rva: u32) -> Option<&'a Section> {
        self.sections.iter()
            .find(|section| section.contains_rva(rva))
    }

    pub fn resolve(&self, rva: u32) -> Result<u64, Error> {
        match self.section_containing(rva) {
            Some(section) => {
                let offset = rva - section.virtual_address;
                Ok(u64::from(section.raw_data_pointer) + u64::from(offset))
            },
            None => Err(Error::NotMapped { rva }),
        }
    }
}
