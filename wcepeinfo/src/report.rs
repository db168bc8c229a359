use std::fmt;
use std::io::{self, Write};

use chrono::DateTime;
use wcepe::Analysis;
use wcepe::ce::CeClassification;
use wcepe::import::ImportedModule;
use wcepe::pe::Characteristics;


/// A named piece of output.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Field {
    pub name: String,
    pub value: Value,
}
impl Field {
    fn new<N: Into<String>>(name: N, value: Value) -> Self {
        Self {
            name: name.into(),
            value,
        }
    }
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Value {
    Bool(bool),
    Number(u64),
    Text(String),

    /// Nested fields; an object in JSON, flattened into the surrounding lines in text.
    Group(Vec<Field>),

    /// Only output as JSON.
    Imports(Vec<ImportedModule>),
}
impl Value {
    fn text<T: Into<String>>(text: T) -> Self {
        Self::Text(text.into())
    }
}

/// Sometimes things go wrong.
#[derive(Debug)]
pub enum Error {
    Io(io::Error),
    Json(serde_json::Error),
}
impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Io(e)
                => write!(f, "I/O error: {}", e),
            Self::Json(e)
                => write!(f, "JSON error: {}", e),
        }
    }
}
impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io(e) => Some(e),
            Self::Json(e) => Some(e),
        }
    }
}
impl From<io::Error> for Error {
    fn from(value: io::Error) -> Self { Self::Io(value) }
}
impl From<serde_json::Error> for Error {
    fn from(value: serde_json::Error) -> Self { Self::Json(value) }
}


/// The Windows CE guesses: `WCEApp`, `WCEVersion` (if known) and `WCEArch`.
pub fn basic_fields(ce: &CeClassification) -> Vec<Field> {
    let mut fields = Vec::with_capacity(3);
    fields.push(Field::new("WCEApp", Value::Bool(ce.is_ce_application)));
    if let Some(version) = &ce.version {
        fields.push(Field::new("WCEVersion", Value::text(version.as_str())));
    }
    fields.push(Field::new("WCEArch", Value::text(ce.architecture)));
    fields
}

/// Everything known about the image, in output order.
pub fn all_fields(analysis: &Analysis) -> Vec<Field> {
    let file_header = &analysis.headers.file_header;
    let opt = &analysis.headers.optional_header;

    let mut fields = basic_fields(&analysis.ce_classification());

    fields.push(Field::new("Machine", Value::Text(format!("0x{:04X}", file_header.machine_type.to_base_type()))));
    fields.push(Field::new("MachineName", Value::text(file_header.machine_type.name())));
    fields.push(Field::new("Timestamp", Value::Number(file_header.time_date_stamp.into())));
    fields.push(Field::new("Date", Value::Text(format_date(file_header.time_date_stamp))));
    fields.push(Field::new("NumberOfSymbols", Value::Number(file_header.symbol_table_count.into())));
    fields.push(Field::new("NumberOfSections", Value::Number(file_header.section_count.into())));
    fields.push(Field::new("SizeOfOptionalHeader", Value::Number(file_header.optional_header_size.into())));

    let characteristics = Characteristics::NAMED.iter()
        .map(|(name, flag)| Field::new(*name, Value::Bool(file_header.characteristics.contains(*flag))))
        .collect();
    fields.push(Field::new("Characteristics", Value::Group(characteristics)));

    fields.push(Field::new("Magic", Value::Text(format!("0x{:04X}", opt.magic))));
    fields.push(Field::new("MajorLinkerVersion", Value::Number(opt.major_linker_version.into())));
    fields.push(Field::new("MinorLinkerVersion", Value::Number(opt.minor_linker_version.into())));
    fields.push(Field::new("LinkerVersion", Value::Text(format!("{}.{}", opt.major_linker_version, opt.minor_linker_version))));
    fields.push(Field::new("SizeOfCode", Value::Number(opt.code_size.into())));
    fields.push(Field::new("SizeOfInitializedData", Value::Number(opt.initialized_data_size.into())));
    fields.push(Field::new("SizeOfUninitializedData", Value::Number(opt.uninitialized_data_size.into())));
    fields.push(Field::new("AddressOfEntryPoint", Value::Number(opt.entry_point_addr.into())));
    fields.push(Field::new("BaseOfCode", Value::Number(opt.base_of_code.into())));
    fields.push(Field::new("BaseOfData", Value::Number(opt.base_of_data.into())));
    fields.push(Field::new("ImageBase", Value::Number(opt.image_base.into())));
    fields.push(Field::new("SectionAlignment", Value::Number(opt.section_alignment.into())));
    fields.push(Field::new("FileAlignment", Value::Number(opt.file_alignment.into())));
    fields.push(Field::new("MajorOperatingSystemVersion", Value::Number(opt.major_os_version.into())));
    fields.push(Field::new("MinorOperatingSystemVersion", Value::Number(opt.minor_os_version.into())));
    fields.push(Field::new("OperatingSystemVersion", Value::Text(format!("{}.{}", opt.major_os_version, opt.minor_os_version))));
    fields.push(Field::new("MajorImageVersion", Value::Number(opt.major_image_version.into())));
    fields.push(Field::new("MinorImageVersion", Value::Number(opt.minor_image_version.into())));
    fields.push(Field::new("ImageVersion", Value::Text(format!("{}.{}", opt.major_image_version, opt.minor_image_version))));
    fields.push(Field::new("MajorSubsystemVersion", Value::Number(opt.major_subsystem_version.into())));
    fields.push(Field::new("MinorSubsystemVersion", Value::Number(opt.minor_subsystem_version.into())));
    fields.push(Field::new("SubsystemVersion", Value::Text(format!("{}.{}", opt.major_subsystem_version, opt.minor_subsystem_version))));
    fields.push(Field::new("SubsystemName", Value::text(opt.subsystem.name())));
    fields.push(Field::new("SizeOfImage", Value::Number(opt.image_size.into())));
    fields.push(Field::new("SizeOfHeaders", Value::Number(opt.headers_size.into())));
    fields.push(Field::new("CheckSum", Value::Number(opt.checksum.into())));
    fields.push(Field::new("Subsystem", Value::Number(opt.subsystem.to_base_type().into())));
    fields.push(Field::new("DllCharacteristics", Value::Number(opt.dll_characteristics.bits().into())));
    fields.push(Field::new("SizeOfStackReserve", Value::Number(opt.stack_reserve_size.into())));
    fields.push(Field::new("SizeOfStackCommit", Value::Number(opt.stack_commit_size.into())));
    fields.push(Field::new("SizeOfHeapReserve", Value::Number(opt.heap_reserve_size.into())));
    fields.push(Field::new("SizeOfHeapCommit", Value::Number(opt.heap_commit_size.into())));
    fields.push(Field::new("LoaderFlags", Value::Number(opt.loader_flags.into())));
    fields.push(Field::new("NumberOfRvaAndSizes", Value::Number(opt.data_directory_entry_count.into())));

    if let Ok(Some(modules)) = &analysis.imports {
        fields.push(Field::new("DLLImports", Value::Imports(modules.clone())));
    }

    if let Ok(Some(version_info)) = &analysis.version_info {
        let version_fields = version_info.string_tables.iter()
            .flat_map(|table| table.strings.iter())
            .map(|(name, value)| Field::new(name.as_str(), Value::text(value.as_str())))
            .collect();
        fields.push(Field::new("versionInfo", Value::Group(version_fields)));
    }

    fields
}

/// The link date in UTC.
pub fn format_date(timestamp: u32) -> String {
    match DateTime::from_timestamp(timestamp.into(), 0) {
        Some(date_time) => date_time.format("%Y-%m-%d").to_string(),
        None => String::new(),
    }
}

/// Finds a field by name, looking into groups.
pub fn find_field<'f>(fields: &'f [Field], name: &str) -> Option<&'f Field> {
    for field in fields {
        match &field.value {
            Value::Group(children) => {
                if let Some(found) = find_field(children, name) {
                    return Some(found);
                }
            },
            _ => {
                if field.name == name {
                    return Some(field);
                }
            },
        }
    }
    None
}

fn text_value(value: &Value) -> Option<String> {
    match value {
        Value::Bool(b) => Some(b.to_string()),
        Value::Number(n) => Some(n.to_string()),
        Value::Text(t) => Some(t.clone()),
        Value::Group(_) => None,
        Value::Imports(_) => None,
    }
}

/// Writes one `Name: value` line per field. Groups are flattened; imports are skipped.
pub fn write_text<W: Write>(fields: &[Field], out: &mut W) -> Result<(), Error> {
    for field in fields {
        match &field.value {
            Value::Group(children) => write_text(children, out)?,
            other => {
                if let Some(text) = text_value(other) {
                    writeln!(out, "{}: {}", field.name, text)?;
                }
            },
        }
    }
    Ok(())
}

/// Writes the bare value of the field.
pub fn write_bare_value<W: Write>(field: &Field, out: &mut W) -> Result<(), Error> {
    if let Some(text) = text_value(&field.value) {
        writeln!(out, "{}", text)?;
    }
    Ok(())
}

pub fn to_json(fields: &[Field]) -> Result<serde_json::Value, Error> {
    let mut object = serde_json::Map::new();
    for field in fields {
        let value = match &field.value {
            Value::Bool(b) => serde_json::Value::Bool(*b),
            Value::Number(n) => serde_json::Value::from(*n),
            Value::Text(t) => serde_json::Value::String(t.clone()),
            Value::Group(children) => to_json(children)?,
            Value::Imports(modules) => {
                let mut entries = Vec::with_capacity(modules.len());
                for module in modules {
                    let mut entry = serde_json::Map::new();
                    entry.insert("dllName".to_owned(), serde_json::Value::String(module.name.clone()));
                    entry.insert("functions".to_owned(), serde_json::to_value(&module.symbols)?);
                    entries.push(serde_json::Value::Object(entry));
                }
                serde_json::Value::Array(entries)
            },
        };
        object.insert(field.name.clone(), value);
    }
    Ok(serde_json::Value::Object(object))
}

pub fn write_json<W: Write>(fields: &[Field], out: &mut W) -> Result<(), Error> {
    let json = to_json(fields)?;
    serde_json::to_writer_pretty(&mut *out, &json)?;
    writeln!(out)?;
    Ok(())
}
