//! Assembles synthetic images for tests.


use crate::pe::{DATA_DIRECTORY_COUNT, KnownDataDirectoryEntry};


const PE_OFFSET: usize = 0x80;
const FILE_ALIGNMENT: usize = 0x200;


fn align_up(value: usize, alignment: usize) -> usize {
    value.div_ceil(alignment) * alignment
}

fn pad4(buf: &mut Vec<u8>) {
    buf.resize(align_up(buf.len(), 4), 0x00);
}

fn put_u16(buf: &mut [u8], offset: usize, value: u16) {
    buf[offset..offset+2].copy_from_slice(&value.to_le_bytes());
}

fn put_u32(buf: &mut [u8], offset: usize, value: u32) {
    buf[offset..offset+4].copy_from_slice(&value.to_le_bytes());
}

pub(crate) fn utf16z(text: &str) -> Vec<u8> {
    let mut ret: Vec<u8> = text.encode_utf16()
        .flat_map(|unit| unit.to_le_bytes())
        .collect();
    ret.extend_from_slice(&[0x00, 0x00]);
    ret
}


/// Builds a minimal PE32 image: an MZ stub pointing at offset 0x80, the PE headers and the
/// sections in the order they were added, each starting at a 0x200-aligned file offset.
pub(crate) struct ImageBuilder {
    pub machine: u16,
    pub subsystem: u16,
    pub timestamp: u32,
    pub characteristics: u16,
    pub subsystem_version: (u16, u16),
    pub optional_header_size: u16,
    sections: Vec<([u8; 8], u32, Vec<u8>)>,
    data_directories: [(u32, u32); DATA_DIRECTORY_COUNT],
}
impl ImageBuilder {
    pub fn new(machine: u16, subsystem: u16) -> Self {
        Self {
            machine,
            subsystem,
            timestamp: 0x4000_0000,
            characteristics: 0x0102,
            subsystem_version: (3, 0),
            optional_header_size: 224,
            sections: Vec::new(),
            data_directories: [(0, 0); DATA_DIRECTORY_COUNT],
        }
    }

    pub fn add_section(&mut self, name: &[u8; 8], virtual_address: u32, data: Vec<u8>) {
        self.sections.push((*name, virtual_address, data));
    }

    pub fn set_data_directory(&mut self, entry: KnownDataDirectoryEntry, address: u32, size: u32) {
        let index: usize = entry.into();
        self.data_directories[index] = (address, size);
    }

    pub fn build(&self) -> Vec<u8> {
        let optional_header_offset = PE_OFFSET + 4 + 20;
        let section_table_offset = optional_header_offset + 224;
        let headers_end = section_table_offset + 40 * self.sections.len();
        let headers_size = align_up(headers_end, FILE_ALIGNMENT);

        let mut image = vec![0u8; headers_size];
        image[0] = b'M';
        image[1] = b'Z';
        put_u32(&mut image, 0x3C, PE_OFFSET as u32);

        image[PE_OFFSET..PE_OFFSET+4].copy_from_slice(b"PE\0\0");
        let file_header = PE_OFFSET + 4;
        put_u16(&mut image, file_header, self.machine);
        put_u16(&mut image, file_header + 2, self.sections.len() as u16);
        put_u32(&mut image, file_header + 4, self.timestamp);
        put_u16(&mut image, file_header + 16, self.optional_header_size);
        put_u16(&mut image, file_header + 18, self.characteristics);

        let image_size = self.sections.iter()
            .map(|(_, va, data)| align_up(*va as usize + data.len(), 0x1000))
            .max()
            .unwrap_or(0x1000);

        let opt = optional_header_offset;
        put_u16(&mut image, opt, 0x010B);
        image[opt + 2] = 6;
        image[opt + 3] = 0;
        put_u32(&mut image, opt + 28, 0x0001_0000);
        put_u32(&mut image, opt + 32, 0x1000);
        put_u32(&mut image, opt + 36, FILE_ALIGNMENT as u32);
        put_u16(&mut image, opt + 40, 4);
        put_u16(&mut image, opt + 48, self.subsystem_version.0);
        put_u16(&mut image, opt + 50, self.subsystem_version.1);
        put_u32(&mut image, opt + 56, image_size as u32);
        put_u32(&mut image, opt + 60, headers_size as u32);
        put_u16(&mut image, opt + 68, self.subsystem);
        put_u32(&mut image, opt + 72, 0x0001_0000);
        put_u32(&mut image, opt + 76, 0x1000);
        put_u32(&mut image, opt + 92, DATA_DIRECTORY_COUNT as u32);
        for (i, (address, size)) in self.data_directories.iter().enumerate() {
            put_u32(&mut image, opt + 96 + 8*i, *address);
            put_u32(&mut image, opt + 100 + 8*i, *size);
        }

        for (i, (name, virtual_address, data)) in self.sections.iter().enumerate() {
            let raw_pointer = image.len();
            let raw_size = align_up(data.len(), FILE_ALIGNMENT);

            let entry = section_table_offset + 40*i;
            image[entry..entry+8].copy_from_slice(name);
            put_u32(&mut image, entry + 8, data.len() as u32);
            put_u32(&mut image, entry + 12, *virtual_address);
            put_u32(&mut image, entry + 16, raw_size as u32);
            put_u32(&mut image, entry + 20, raw_pointer as u32);
            put_u32(&mut image, entry + 36, 0x4000_0040);

            image.extend_from_slice(data);
            image.resize(raw_pointer + raw_size, 0x00);
        }

        image
    }
}


pub(crate) enum ResourceKey {
    Id(u32),
    Name(&'static str),
}

pub(crate) enum ResourceNode {
    Directory(Vec<(ResourceKey, ResourceNode)>),
    Leaf { data: Vec<u8>, codepage: u32 },
}

/// Lays out a resource tree as it would appear at the start of a section mapped at
/// `section_rva`.
///
/// Directories are written in pre-order, so every subdirectory lies beyond all of its ancestors.
/// Named entries must precede numbered ones in each directory.
pub(crate) fn build_resource_tree(root: &ResourceNode, section_rva: u32) -> Vec<u8> {
    let mut out = Vec::new();
    let mut leaves = Vec::new();
    let mut names = Vec::new();
    write_resource_directory(root, &mut out, &mut leaves, &mut names);

    let mut blobs = Vec::new();
    for (value_slot, data, codepage) in leaves {
        let entry_offset = out.len();
        put_u32(&mut out, value_slot, entry_offset as u32);
        out.extend_from_slice(&[0u8; 16]);
        put_u32(&mut out, entry_offset + 4, data.len() as u32);
        put_u32(&mut out, entry_offset + 8, codepage);
        blobs.push((entry_offset, data));
    }

    for (name_slot, name) in names {
        let name_offset = out.len();
        put_u32(&mut out, name_slot, 0x8000_0000 | name_offset as u32);
        let units: Vec<u16> = name.encode_utf16().collect();
        out.extend_from_slice(&(units.len() as u16).to_le_bytes());
        for unit in units {
            out.extend_from_slice(&unit.to_le_bytes());
        }
    }

    for (entry_offset, data) in blobs {
        pad4(&mut out);
        let data_offset = out.len();
        put_u32(&mut out, entry_offset, section_rva + data_offset as u32);
        out.extend_from_slice(data);
    }

    out
}

fn write_resource_directory<'n>(
    node: &'n ResourceNode,
    out: &mut Vec<u8>,
    leaves: &mut Vec<(usize, &'n [u8], u32)>,
    names: &mut Vec<(usize, &'static str)>,
) {
    let ResourceNode::Directory(entries) = node else {
        panic!("resource tree root must be a directory");
    };

    let name_count = entries.iter()
        .filter(|(key, _)| matches!(key, ResourceKey::Name(_)))
        .count();
    let id_count = entries.len() - name_count;

    let start = out.len();
    out.extend_from_slice(&[0u8; 16]);
    put_u16(out, start + 12, name_count as u16);
    put_u16(out, start + 14, id_count as u16);
    out.resize(start + 16 + 8*entries.len(), 0x00);

    for (i, (key, child)) in entries.iter().enumerate() {
        let slot = start + 16 + 8*i;
        match key {
            ResourceKey::Id(id) => put_u32(out, slot, *id),
            ResourceKey::Name(name) => names.push((slot, *name)),
        }
        match child {
            ResourceNode::Directory(_) => {
                let child_offset = out.len();
                put_u32(out, slot + 4, 0x8000_0000 | child_offset as u32);
                write_resource_directory(child, out, leaves, names);
            },
            ResourceNode::Leaf { data, codepage } => {
                leaves.push((slot + 4, data.as_slice(), *codepage));
            },
        }
    }
}


/// Encodes a version info record (`wLength`, `wValueLength`, `wType`, key, value, children)
/// with 4-byte alignment between its parts.
pub(crate) fn version_record(key: &str, value_type: u16, value_length: u16, value: &[u8], children: &[Vec<u8>]) -> Vec<u8> {
    let mut out = vec![0u8; 6];
    out.extend_from_slice(&utf16z(key));
    if !value.is_empty() {
        pad4(&mut out);
        out.extend_from_slice(value);
    }
    for child in children {
        pad4(&mut out);
        out.extend_from_slice(child);
    }
    let total_length = out.len() as u16;
    put_u16(&mut out, 0, total_length);
    put_u16(&mut out, 2, value_length);
    put_u16(&mut out, 4, value_type);
    out
}

pub(crate) fn version_string(name: &str, value: &str) -> Vec<u8> {
    let value_bytes = utf16z(value);
    version_record(name, 1, (value_bytes.len() / 2) as u16, &value_bytes, &[])
}

pub(crate) fn fixed_file_info(file_version: [u16; 4], product_version: [u16; 4]) -> Vec<u8> {
    let mut out = vec![0u8; 52];
    put_u32(&mut out, 0, 0xFEEF_04BD);
    put_u32(&mut out, 4, 0x0001_0000);
    put_u32(&mut out, 8, (u32::from(file_version[0]) << 16) | u32::from(file_version[1]));
    put_u32(&mut out, 12, (u32::from(file_version[2]) << 16) | u32::from(file_version[3]));
    put_u32(&mut out, 16, (u32::from(product_version[0]) << 16) | u32::from(product_version[1]));
    put_u32(&mut out, 20, (u32::from(product_version[2]) << 16) | u32::from(product_version[3]));
    put_u32(&mut out, 24, 0x3F);
    put_u32(&mut out, 32, 0x0005_0004);
    put_u32(&mut out, 36, 0x1);
    out
}

pub(crate) fn string_file_info(tables: &[(&str, &[(&str, &str)])]) -> Vec<u8> {
    let table_records: Vec<Vec<u8>> = tables.iter()
        .map(|(key, strings)| {
            let string_records: Vec<Vec<u8>> = strings.iter()
                .map(|(name, value)| version_string(name, value))
                .collect();
            version_record(key, 1, 0, &[], &string_records)
        })
        .collect();
    version_record("StringFileInfo", 1, 0, &[], &table_records)
}

pub(crate) fn var_file_info() -> Vec<u8> {
    let translation = version_record("Translation", 0, 4, &[0x09, 0x04, 0xE4, 0x04], &[]);
    version_record("VarFileInfo", 1, 0, &[], &[translation])
}

/// A complete `VS_VERSION_INFO` resource with a fixed file info, one `StringFileInfo` holding
/// the given tables and a `VarFileInfo`.
pub(crate) fn version_resource(tables: &[(&str, &[(&str, &str)])]) -> Vec<u8> {
    let fixed = fixed_file_info([1, 2, 3, 4], [1, 2, 0, 0]);
    version_record(
        "VS_VERSION_INFO",
        0,
        fixed.len() as u16,
        &fixed,
        &[string_file_info(tables), var_file_info()],
    )
}


pub(crate) enum TestThunk {
    Name(&'static str),
    Ordinal(u16),
}

/// Lays out an import directory at the start of a section mapped at `section_rva`: the
/// descriptors with their all-zero terminator, then thunk arrays, module names and hint/name
/// entries. Returns the section data and the size of the descriptor array.
///
/// With `lookup_tables`, each descriptor gets an import lookup table in addition to its import
/// address table; otherwise only `first_thunk` is set.
pub(crate) fn build_import_section(section_rva: u32, modules: &[(&str, Vec<TestThunk>)], lookup_tables: bool) -> (Vec<u8>, u32) {
    let descriptors_size = 20 * (modules.len() + 1);
    let mut out = vec![0u8; descriptors_size];

    for (i, (module_name, thunks)) in modules.iter().enumerate() {
        let descriptor = 20 * i;

        let mut thunk_values = Vec::with_capacity(thunks.len());
        let name_offset = out.len();
        out.extend_from_slice(module_name.as_bytes());
        out.push(0x00);
        for thunk in thunks {
            match thunk {
                TestThunk::Ordinal(ordinal) => thunk_values.push(0x8000_0000 | u32::from(*ordinal)),
                TestThunk::Name(name) => {
                    if out.len() % 2 != 0 {
                        out.push(0x00);
                    }
                    let hint_offset = out.len();
                    out.extend_from_slice(&[0x00, 0x00]);
                    out.extend_from_slice(name.as_bytes());
                    out.push(0x00);
                    thunk_values.push(section_rva + hint_offset as u32);
                },
            }
        }
        pad4(&mut out);

        let write_thunk_array = |out: &mut Vec<u8>| -> u32 {
            let array_offset = out.len();
            for value in &thunk_values {
                out.extend_from_slice(&value.to_le_bytes());
            }
            out.extend_from_slice(&[0u8; 4]);
            section_rva + array_offset as u32
        };
        let first_thunk = write_thunk_array(&mut out);
        let original_first_thunk = if lookup_tables { write_thunk_array(&mut out) } else { 0 };

        put_u32(&mut out, descriptor, original_first_thunk);
        put_u32(&mut out, descriptor + 12, section_rva + name_offset as u32);
        put_u32(&mut out, descriptor + 16, first_thunk);
    }

    (out, descriptors_size as u32)
}
