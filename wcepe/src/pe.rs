//! Portable Executable headers as used by Windows CE.
//!
//! Only the 32-bit (PE32) optional header layout is supported. Windows CE never shipped PE32+
//! images, so those are rejected as soon as the optional header size gives them away.

use bitflags::bitflags;
use from_to_repr::from_to_other;
use tracing::debug;

use crate::{ByteSource, Error, HeaderCheck};
use crate::rva::AddressResolver;


/// Offset of the 16-bit pointer to the PE signature.
pub const COFF_POINTER_OFFSET: u64 = 0x3C;
pub const PE_SIGNATURE: [u8; 4] = *b"PE\0\0";
pub const PE32_MAGIC: u16 = 0x010B;
pub const PE32_PLUS_MAGIC: u16 = 0x020B;
pub const FILE_HEADER_SIZE: u16 = 20;
pub const PE32_OPTIONAL_HEADER_SIZE: u16 = 224;
pub const DATA_DIRECTORY_COUNT: usize = 16;
pub const SECTION_HEADER_SIZE: u16 = 40;


/// Everything read from the headers of a PE32 image.
#[derive(Clone, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub struct Headers {
    /// File offset of the `PE\0\0` signature.
    pub coff_offset: u16,
    pub file_header: FileHeader,
    pub optional_header: OptionalHeader,
    pub sections: SectionTable,
}
impl Headers {
    pub fn read<S: ByteSource + ?Sized>(source: &S) -> Result<Self, Error> {
        // only 16 bits of the pointer are honored; the upper half is garbage in some CE images
        let coff_offset = source.read_u16_le(COFF_POINTER_OFFSET)?;
        let coff_position = u64::from(coff_offset);

        let signature: [u8; 4] = source.read_array(coff_position)?;
        if signature != PE_SIGNATURE {
            return Err(Error::MalformedHeader {
                check: HeaderCheck::Signature { found: u32::from_le_bytes(signature) },
                offset: coff_position,
            });
        }

        let file_header_position = coff_position + 4;
        let file_header_buf: [u8; FILE_HEADER_SIZE as usize] = source.read_array(file_header_position)?;
        let file_header = FileHeader::from_bytes(&file_header_buf);

        let optional_header_position = file_header_position + u64::from(FILE_HEADER_SIZE);
        let magic = source.read_u16_le(optional_header_position)?;
        if magic != PE32_MAGIC {
            return Err(Error::MalformedHeader {
                check: HeaderCheck::OptionalMagic { found: magic },
                offset: optional_header_position,
            });
        }
        if file_header.optional_header_size != PE32_OPTIONAL_HEADER_SIZE {
            return Err(Error::MalformedHeader {
                check: HeaderCheck::OptionalHeaderSize { found: file_header.optional_header_size },
                // position of the SizeOfOptionalHeader field
                offset: file_header_position + 16,
            });
        }

        let optional_header_buf: [u8; PE32_OPTIONAL_HEADER_SIZE as usize] = source.read_array(optional_header_position)?;
        let optional_header = OptionalHeader::from_bytes(&optional_header_buf);

        let section_table_position = optional_header_position + u64::from(PE32_OPTIONAL_HEADER_SIZE);
        let mut entries = Vec::with_capacity(file_header.section_count.into());
        for i in 0..u64::from(file_header.section_count) {
            let entry_position = section_table_position + i * u64::from(SECTION_HEADER_SIZE);
            let entry_buf: [u8; SECTION_HEADER_SIZE as usize] = source.read_array(entry_position)?;
            let section = Section::from_bytes(&entry_buf);
            debug!(
                "section {:?}: virtual {:#010X}+{:#X}, raw {:#010X}+{:#X}",
                section.name_lossy(), section.virtual_address, section.virtual_size,
                section.raw_data_pointer, section.raw_data_size,
            );
            entries.push(section);
        }

        Ok(Self {
            coff_offset,
            file_header,
            optional_header,
            sections: SectionTable::from(entries),
        })
    }

    pub fn data_directory(&self, known_entry: KnownDataDirectoryEntry) -> DataDirectoryEntry {
        self.optional_header.known_data_directory_entry(known_entry)
    }

    pub fn resolver(&self) -> AddressResolver<'_> {
        AddressResolver::new(self.sections.as_entries())
    }
}


#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub struct FileHeader {
    pub machine_type: MachineType, // u16
    pub section_count: u16,
    pub time_date_stamp: u32,
    pub symbol_table_pointer: u32, // COFF debug info, deprecated
    pub symbol_table_count: u32, // COFF debug info, deprecated
    pub optional_header_size: u16,
    pub characteristics: Characteristics, // u16
}
impl FileHeader {
    fn from_bytes(header_buf: &[u8; FILE_HEADER_SIZE as usize]) -> Self {
        Self {
            machine_type: MachineType::from_base_type(le_u16(header_buf, 0)),
            section_count: le_u16(header_buf, 2),
            time_date_stamp: le_u32(header_buf, 4),
            symbol_table_pointer: le_u32(header_buf, 8),
            symbol_table_count: le_u32(header_buf, 12),
            optional_header_size: le_u16(header_buf, 16),
            characteristics: Characteristics::from_bits_retain(le_u16(header_buf, 18)),
        }
    }
}

#[derive(Clone, Copy, Debug)]
#[from_to_other(base_type = u16, derive_compare = "as_int")]
pub enum MachineType {
    Unknown = 0x0000,
    Alpha64 = 0x0284,
    MatsushitaAm33 = 0x01D3,
    Amd64 = 0x8664,
    Arm = 0x01C0,
    Arm64 = 0xAA64,
    ArmThumb2 = 0x01C4,
    EfiByteCode = 0x0EBC,
    I386 = 0x014C,
    Itanium = 0x0200,
    MitsubishiM32r = 0x9041,
    Mips16 = 0x0266,
    MipsWithFpu = 0x0366,
    Mips16WithFpu = 0x0466,
    PowerPc = 0x01F0,
    PowerPcWithFpu = 0x01F1,
    MipsR4k = 0x0166,
    RiscV32 = 0x5032,
    RiscV64 = 0x5064,
    RiscV128 = 0x5128,
    HitachiSh3 = 0x01A2,
    HitachiSh3Dsp = 0x01A3,
    HitachiSh4 = 0x01A6,
    HitachiSh5 = 0x01A8,
    ArmThumb = 0x01C2,
    WceMipsV2 = 0x0169,
    Other(u16),
}
impl MachineType {
    /// The conventional upper-case name of the machine type, or `"INVALID"` if the code is not
    /// known.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Unknown => "UNKNOWN",
            Self::Alpha64 => "ALPHA64",
            Self::MatsushitaAm33 => "AM33",
            Self::Amd64 => "AMD64",
            Self::Arm => "ARM",
            Self::Arm64 => "ARM64",
            Self::ArmThumb2 => "ARMNT",
            Self::EfiByteCode => "EBC",
            Self::I386 => "I386",
            Self::Itanium => "IA64",
            Self::MitsubishiM32r => "M32R",
            Self::Mips16 => "MIPS16",
            Self::MipsWithFpu => "MIPSFPU",
            Self::Mips16WithFpu => "MIPSFPU16",
            Self::PowerPc => "POWERPC",
            Self::PowerPcWithFpu => "POWERPCFP",
            Self::MipsR4k => "R4000",
            Self::RiscV32 => "RISCV32",
            Self::RiscV64 => "RISCV64",
            Self::RiscV128 => "RISCV128",
            Self::HitachiSh3 => "SH3",
            Self::HitachiSh3Dsp => "SH3DSP",
            Self::HitachiSh4 => "SH4",
            Self::HitachiSh5 => "SH5",
            Self::ArmThumb => "THUMB",
            Self::WceMipsV2 => "WCEMIPSV2",
            Self::Other(_) => "INVALID",
        }
    }
}
#[cfg(feature = "serde")]
impl serde::Serialize for MachineType {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.to_base_type().serialize(serializer)
    }
}
#[cfg(feature = "serde")]
impl<'d> serde::Deserialize<'d> for MachineType {
    fn deserialize<D: serde::Deserializer<'d>>(deserializer: D) -> Result<Self, D::Error> {
        let code = u16::deserialize(deserializer)?;
        Ok(Self::from_base_type(code))
    }
}

bitflags! {
    #[derive(Clone, Copy, Debug, Default, Eq, Hash, Ord, PartialEq, PartialOrd)]
    #[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
    pub struct Characteristics : u16 {
        const RELOCS_STRIPPED = 0x0001;
        const EXECUTABLE_IMAGE = 0x0002;
        const LINE_NUMS_STRIPPED = 0x0004;
        const LOCAL_SYMS_STRIPPED = 0x0008;
        const AGGRESSIVE_WS_TRIM = 0x0010;
        const LARGE_ADDRESS_AWARE = 0x0020;
        // 0x0040 unused
        const BYTES_REVERSED_LO = 0x0080;
        const MACHINE_32BIT = 0x0100;
        const DEBUG_STRIPPED = 0x0200;

        /// Copy to swap and run from there if started from removable media.
        const REMOVABLE_RUN_FROM_SWAP = 0x0400;

        /// Copy to swap and run from there if started from a network share.
        const NET_RUN_FROM_SWAP = 0x0800;

        const SYSTEM = 0x1000;
        const DLL = 0x2000;
        const UP_SYSTEM_ONLY = 0x4000;
        const BYTES_REVERSED_HI = 0x8000;
    }
}
impl Characteristics {
    /// Each defined flag with its `winnt.h` name, in bit order.
    pub const NAMED: [(&'static str, Characteristics); 15] = [
        ("IMAGE_FILE_RELOCS_STRIPPED", Characteristics::RELOCS_STRIPPED),
        ("IMAGE_FILE_EXECUTABLE_IMAGE", Characteristics::EXECUTABLE_IMAGE),
        ("IMAGE_FILE_LINE_NUMS_STRIPPED", Characteristics::LINE_NUMS_STRIPPED),
        ("IMAGE_FILE_LOCAL_SYMS_STRIPPED", Characteristics::LOCAL_SYMS_STRIPPED),
        ("IMAGE_FILE_AGGRESSIVE_WS_TRIM", Characteristics::AGGRESSIVE_WS_TRIM),
        ("IMAGE_FILE_LARGE_ADDRESS_AWARE", Characteristics::LARGE_ADDRESS_AWARE),
        ("IMAGE_FILE_BYTES_REVERSED_LO", Characteristics::BYTES_REVERSED_LO),
        ("IMAGE_FILE_32BIT_MACHINE", Characteristics::MACHINE_32BIT),
        ("IMAGE_FILE_DEBUG_STRIPPED", Characteristics::DEBUG_STRIPPED),
        ("IMAGE_FILE_REMOVABLE_RUN_FROM_SWAP", Characteristics::REMOVABLE_RUN_FROM_SWAP),
        ("IMAGE_FILE_NET_RUN_FROM_SWAP", Characteristics::NET_RUN_FROM_SWAP),
        ("IMAGE_FILE_SYSTEM", Characteristics::SYSTEM),
        ("IMAGE_FILE_DLL", Characteristics::DLL),
        ("IMAGE_FILE_UP_SYSTEM_ONLY", Characteristics::UP_SYSTEM_ONLY),
        ("IMAGE_FILE_BYTES_REVERSED_HI", Characteristics::BYTES_REVERSED_HI),
    ];
}


/// The PE32 optional header.
#[derive(Clone, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub struct OptionalHeader {
    pub magic: u16,
    pub major_linker_version: u8,
    pub minor_linker_version: u8,
    pub code_size: u32,
    pub initialized_data_size: u32,
    pub uninitialized_data_size: u32,
    pub entry_point_addr: u32,
    pub base_of_code: u32,
    pub base_of_data: u32,
    pub image_base: u32,
    pub section_alignment: u32,
    pub file_alignment: u32,
    pub major_os_version: u16,
    pub minor_os_version: u16,
    pub major_image_version: u16,
    pub minor_image_version: u16,
    pub major_subsystem_version: u16,
    pub minor_subsystem_version: u16,
    pub win32_version_value: u32,
    pub image_size: u32,
    pub headers_size: u32,
    pub checksum: u32,
    pub subsystem: Subsystem, // u16
    pub dll_characteristics: DllCharacteristics, // u16
    pub stack_reserve_size: u32,
    pub stack_commit_size: u32,
    pub heap_reserve_size: u32,
    pub heap_commit_size: u32,
    pub loader_flags: u32,
    pub data_directory_entry_count: u32,
    pub data_directory_entries: [DataDirectoryEntry; DATA_DIRECTORY_COUNT],
}
impl OptionalHeader {
    fn from_bytes(buf: &[u8; PE32_OPTIONAL_HEADER_SIZE as usize]) -> Self {
        let mut data_directory_entries = [DataDirectoryEntry::default(); DATA_DIRECTORY_COUNT];
        for (i, entry) in data_directory_entries.iter_mut().enumerate() {
            let entry_offset = 96 + 8*i;
            *entry = DataDirectoryEntry {
                address: le_u32(buf, entry_offset),
                size: le_u32(buf, entry_offset + 4),
            };
        }

        Self {
            magic: le_u16(buf, 0),
            major_linker_version: buf[2],
            minor_linker_version: buf[3],
            code_size: le_u32(buf, 4),
            initialized_data_size: le_u32(buf, 8),
            uninitialized_data_size: le_u32(buf, 12),
            entry_point_addr: le_u32(buf, 16),
            base_of_code: le_u32(buf, 20),
            base_of_data: le_u32(buf, 24),
            image_base: le_u32(buf, 28),
            section_alignment: le_u32(buf, 32),
            file_alignment: le_u32(buf, 36),
            major_os_version: le_u16(buf, 40),
            minor_os_version: le_u16(buf, 42),
            major_image_version: le_u16(buf, 44),
            minor_image_version: le_u16(buf, 46),
            major_subsystem_version: le_u16(buf, 48),
            minor_subsystem_version: le_u16(buf, 50),
            win32_version_value: le_u32(buf, 52),
            image_size: le_u32(buf, 56),
            headers_size: le_u32(buf, 60),
            checksum: le_u32(buf, 64),
            subsystem: Subsystem::from_base_type(le_u16(buf, 68)),
            dll_characteristics: DllCharacteristics::from_bits_retain(le_u16(buf, 70)),
            stack_reserve_size: le_u32(buf, 72),
            stack_commit_size: le_u32(buf, 76),
            heap_reserve_size: le_u32(buf, 80),
            heap_commit_size: le_u32(buf, 84),
            loader_flags: le_u32(buf, 88),
            data_directory_entry_count: le_u32(buf, 92),
            data_directory_entries,
        }
    }

    pub fn known_data_directory_entry(&self, known_entry: KnownDataDirectoryEntry) -> DataDirectoryEntry {
        let index: usize = known_entry.into();
        self.data_directory_entries[index]
    }
}

#[derive(Clone, Copy, Debug)]
#[from_to_other(base_type = u16, derive_compare = "as_int")]
pub enum Subsystem {
    Unknown = 0,
    Native = 1,
    WindowsGui = 2,
    WindowsCui = 3,
    Os2Cui = 5,
    PosixCui = 7,

    /// Windows 9x drivers.
    NativeWindows = 8,

    WindowsCeGui = 9,
    EfiApplication = 10,
    EfiBootServiceDriver = 11,
    EfiRuntimeDriver = 12,
    EfiRom = 13,
    Xbox = 14,
    WindowsBootApplication = 16,
    Other(u16),
}
impl Subsystem {
    /// The conventional upper-case name of the subsystem; unrecognized values are `"UNKNOWN"`.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Unknown => "UNKNOWN",
            Self::Native => "NATIVE",
            Self::WindowsGui => "WINDOWS_GUI",
            Self::WindowsCui => "WINDOWS_CUI",
            Self::Os2Cui => "OS2_CUI",
            Self::PosixCui => "POSIX_CUI",
            Self::NativeWindows => "NATIVE_WINDOWS",
            Self::WindowsCeGui => "WINDOWS_CE_GUI",
            Self::EfiApplication => "EFI_APPLICATION",
            Self::EfiBootServiceDriver => "EFI_BOOT_SERVICE_DRIVER",
            Self::EfiRuntimeDriver => "EFI_RUNTIME_DRIVER",
            Self::EfiRom => "EFI_ROM",
            Self::Xbox => "XBOX",
            Self::WindowsBootApplication => "WINDOWS_BOOT_APPLICATION",
            Self::Other(_) => "UNKNOWN",
        }
    }
}
#[cfg(feature = "serde")]
impl serde::Serialize for Subsystem {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.to_base_type().serialize(serializer)
    }
}
#[cfg(feature = "serde")]
impl<'d> serde::Deserialize<'d> for Subsystem {
    fn deserialize<D: serde::Deserializer<'d>>(deserializer: D) -> Result<Self, D::Error> {
        let code = u16::deserialize(deserializer)?;
        Ok(Self::from_base_type(code))
    }
}

bitflags! {
    #[derive(Clone, Copy, Debug, Default, Eq, Hash, Ord, PartialEq, PartialOrd)]
    #[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
    pub struct DllCharacteristics : u16 {
        const HIGH_ENTROPY_VA = 0x0020;
        const DYNAMIC_BASE = 0x0040;
        const FORCE_INTEGRITY = 0x0080;
        const NX_COMPAT = 0x0100;
        const NO_ISOLATION = 0x0200;
        const NO_SEH = 0x0400;
        const NO_BIND = 0x0800;
        const APPCONTAINER = 0x1000;
        const WDM_DRIVER = 0x2000;
        const GUARD_CF = 0x4000;
        const TERMINAL_SERVER_AWARE = 0x8000;
    }
}

#[derive(Clone, Copy, Debug, Default, Eq, Hash, Ord, PartialEq, PartialOrd)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub struct DataDirectoryEntry {
    pub address: u32,
    pub size: u32,
}
impl DataDirectoryEntry {
    /// Whether the entry points nowhere. An RVA of 0 with a nonzero size is a valid location.
    pub fn is_empty(&self) -> bool {
        self.address == 0 && self.size == 0
    }
}

/// The slots of the data directory, numbered by their index.
#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub enum KnownDataDirectoryEntry {
    ExportTable = 0,
    ImportTable = 1,
    ResourceTable = 2,
    ExceptionTable = 3,
    CertificateTable = 4,
    BaseRelocationTable = 5,
    Debug = 6,
    Architecture = 7,
    GlobalPtr = 8,
    TlsTable = 9,
    LoadConfigTable = 10,
    BoundImport = 11,
    ImportAddressTable = 12,
    DelayImportDescriptor = 13,
    ClrRuntimeHeader = 14,
    Reserved = 15,
}
impl KnownDataDirectoryEntry {
    pub const ALL: [Self; DATA_DIRECTORY_COUNT] = [
        Self::ExportTable, Self::ImportTable, Self::ResourceTable, Self::ExceptionTable,
        Self::CertificateTable, Self::BaseRelocationTable, Self::Debug, Self::Architecture,
        Self::GlobalPtr, Self::TlsTable, Self::LoadConfigTable, Self::BoundImport,
        Self::ImportAddressTable, Self::DelayImportDescriptor, Self::ClrRuntimeHeader, Self::Reserved,
    ];
}
impl From<KnownDataDirectoryEntry> for usize {
    fn from(value: KnownDataDirectoryEntry) -> Self { value as usize }
}

/// The section table in file order.
///
/// The order is preserved as read; address resolution relies on it.
#[derive(Clone, Debug, Default, Eq, Hash, Ord, PartialEq, PartialOrd)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub struct SectionTable {
    entries: Vec<Section>,
}
impl SectionTable {
    pub fn as_entries(&self) -> &[Section] {
        &self.entries
    }
}
impl From<Vec<Section>> for SectionTable {
    fn from(value: Vec<Section>) -> Self {
        Self {
            entries: value,
        }
    }
}
impl From<SectionTable> for Vec<Section> {
    fn from(value: SectionTable) -> Self { value.entries }
}

#[derive(Clone, Copy, Debug, Default, Eq, Hash, Ord, PartialEq, PartialOrd)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub struct Section {
    pub name: [u8; 8],
    pub virtual_size: u32,
    pub virtual_address: u32,
    pub raw_data_size: u32,
    pub raw_data_pointer: u32,
    pub relocations_pointer: u32,
    pub line_numbers_pointer: u32,
    pub relocations_count: u16,
    pub line_numbers_count: u16,
    pub characteristics: SectionCharacteristics, // u32
}
impl Section {
    fn from_bytes(entry_buf: &[u8; SECTION_HEADER_SIZE as usize]) -> Self {
        let mut name = [0u8; 8];
        name.copy_from_slice(&entry_buf[0..8]);

        Self {
            name,
            virtual_size: le_u32(entry_buf, 8),
            virtual_address: le_u32(entry_buf, 12),
            raw_data_size: le_u32(entry_buf, 16),
            raw_data_pointer: le_u32(entry_buf, 20),
            relocations_pointer: le_u32(entry_buf, 24),
            line_numbers_pointer: le_u32(entry_buf, 28),
            relocations_count: le_u16(entry_buf, 32),
            line_numbers_count: le_u16(entry_buf, 34),
            characteristics: SectionCharacteristics::from_bits_retain(le_u32(entry_buf, 36)),
        }
    }

    /// The section name with NUL padding removed. Invalid UTF-8 is replaced.
    pub fn name_lossy(&self) -> String {
        let end = self.name.iter()
            .position(|&b| b == 0x00)
            .unwrap_or(self.name.len());
        String::from_utf8_lossy(&self.name[..end]).into_owned()
    }

    /// Whether the RVA falls into `[virtual_address, virtual_address + virtual_size)`.
    pub fn contains_rva(&self, rva: u32) -> bool {
        // subtract instead of add so that sections at the top of the address space cannot wrap
        rva >= self.virtual_address && rva - self.virtual_address < self.virtual_size
    }
}

bitflags! {
    /// The `IMAGE_SCN_*` flags that occur in Windows CE images; other bits are retained as read.
    #[derive(Clone, Copy, Debug, Default, Eq, Hash, Ord, PartialEq, PartialOrd)]
    #[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
    pub struct SectionCharacteristics : u32 {
        const CNT_CODE = 0x0000_0020;
        const CNT_INITIALIZED_DATA = 0x0000_0040;
        const CNT_UNINITIALIZED_DATA = 0x0000_0080;
        const MEM_DISCARDABLE = 0x0200_0000;
        const MEM_NOT_CACHED = 0x0400_0000;
        const MEM_NOT_PAGED = 0x0800_0000;
        const MEM_SHARED = 0x1000_0000;
        const MEM_EXECUTE = 0x2000_0000;
        const MEM_READ = 0x4000_0000;
        const MEM_WRITE = 0x8000_0000;
    }
}


fn le_u16(buf: &[u8], offset: usize) -> u16 {
    u16::from_le_bytes([buf[offset], buf[offset+1]])
}

fn le_u32(buf: &[u8], offset: usize) -> u32 {
    u32::from_le_bytes([buf[offset], buf[offset+1], buf[offset+2], buf[offset+3]])
}


#[cfg(test)]
mod tests {
    use super::{Characteristics, Headers, KnownDataDirectoryEntry, MachineType, Subsystem};
    use crate::{Error, HeaderCheck};
    use crate::testutil::ImageBuilder;

    #[test]
    fn test_read_headers() {
        let mut builder = ImageBuilder::new(0x01C0, 9);
        builder.timestamp = 0x3A2B_3C4D;
        builder.characteristics = 0x0102;
        builder.subsystem_version = (4, 20);
        builder.add_section(b".text\0\0\0", 0x1000, vec![0xAA; 0x40]);
        builder.add_section(b".rsrc\0\0\0", 0x2000, vec![0xBB; 0x20]);
        builder.set_data_directory(KnownDataDirectoryEntry::ResourceTable, 0x2000, 0x20);
        let image = builder.build();

        let headers = Headers::read(&image).unwrap();
        assert_eq!(headers.coff_offset, 0x80);
        assert_eq!(headers.file_header.machine_type, MachineType::Arm);
        assert_eq!(headers.file_header.machine_type.name(), "ARM");
        assert_eq!(headers.file_header.section_count, 2);
        assert_eq!(headers.file_header.time_date_stamp, 0x3A2B_3C4D);
        assert_eq!(
            headers.file_header.characteristics,
            Characteristics::EXECUTABLE_IMAGE | Characteristics::MACHINE_32BIT,
        );
        assert_eq!(headers.optional_header.subsystem, Subsystem::WindowsCeGui);
        assert_eq!(headers.optional_header.subsystem.name(), "WINDOWS_CE_GUI");
        assert_eq!(headers.optional_header.major_subsystem_version, 4);
        assert_eq!(headers.optional_header.minor_subsystem_version, 20);
        assert_eq!(headers.optional_header.data_directory_entry_count, 16);

        let resources = headers.data_directory(KnownDataDirectoryEntry::ResourceTable);
        assert_eq!(resources.address, 0x2000);
        assert_eq!(resources.size, 0x20);
        assert!(headers.data_directory(KnownDataDirectoryEntry::ImportTable).is_empty());

        let sections = headers.sections.as_entries();
        assert_eq!(sections.len(), 2);
        assert_eq!(sections[0].name_lossy(), ".text");
        assert_eq!(sections[0].virtual_address, 0x1000);
        assert_eq!(sections[1].name_lossy(), ".rsrc");
        assert_eq!(sections[1].raw_data_pointer, sections[0].raw_data_pointer + 0x200);
    }

    #[test]
    fn test_bad_signature() {
        let mut image = ImageBuilder::new(0x01A2, 9).build();
        image[0x80 + 1] = b'X';
        match Headers::read(&image) {
            Err(Error::MalformedHeader { check: HeaderCheck::Signature { .. }, offset: 0x80 }) => {},
            other => panic!("unexpected result {:?}", other),
        }
    }

    #[test]
    fn test_pe32_plus_magic() {
        let mut image = ImageBuilder::new(0x01C0, 9).build();
        // magic lives right behind the file header
        image[0x80 + 24] = 0x0B;
        image[0x80 + 25] = 0x02;
        match Headers::read(&image) {
            Err(Error::MalformedHeader { check: HeaderCheck::OptionalMagic { found: 0x020B }, offset: 0x98 }) => {},
            other => panic!("unexpected result {:?}", other),
        }
    }

    #[test]
    fn test_pe32_plus_size() {
        let mut builder = ImageBuilder::new(0x01C0, 9);
        builder.optional_header_size = 240;
        let image = builder.build();
        match Headers::read(&image) {
            Err(Error::MalformedHeader { check: HeaderCheck::OptionalHeaderSize { found: 240 }, offset: 0x94 }) => {},
            other => panic!("unexpected result {:?}", other),
        }
    }

    #[test]
    fn test_truncated() {
        let image = ImageBuilder::new(0x01C0, 9).build();
        let truncated = image[..0x80 + 100].to_vec();
        assert!(matches!(Headers::read(&truncated), Err(Error::OutOfBounds { .. })));

        let tiny = vec![0x4D, 0x5A];
        assert!(matches!(Headers::read(&tiny), Err(Error::OutOfBounds { .. })));
    }

    #[test]
    fn test_unknown_codes() {
        let mut builder = ImageBuilder::new(0x1234, 0x0042);
        builder.subsystem_version = (2, 0);
        let headers = Headers::read(&builder.build()).unwrap();
        assert_eq!(headers.file_header.machine_type, MachineType::Other(0x1234));
        assert_eq!(headers.file_header.machine_type.name(), "INVALID");
        assert_eq!(headers.optional_header.subsystem.name(), "UNKNOWN");
    }
}
