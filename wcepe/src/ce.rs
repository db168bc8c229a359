//! Guessing whether and for which Windows CE version an image was built.
//!
//! Windows CE images are ordinary PE32 images; nothing in the headers says "Windows CE" with
//! certainty. The rules here are heuristics:
//!
//! * An image is considered a CE application if its subsystem is `WINDOWS_CE_GUI`, or if it is
//!   `WINDOWS_GUI` and built for an architecture that desktop Windows never ran on.
//! * The CE version is the subsystem version, except for subsystem version 4.0. Windows CE 1.0
//!   applications commonly declared 4.0 too, so 4.0 is only reported (as 1.0) for images linked
//!   before 2000 for MIPS or SH3; otherwise the version is left unknown.


use crate::pe::{Headers, MachineType, Subsystem};


/// Midnight, 2000-01-01 UTC.
pub const YEAR_2000_TIMESTAMP: u32 = 946_684_800;


#[derive(Clone, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct CeClassification {
    pub is_ce_application: bool,
    pub version: Option<String>,
    pub architecture: &'static str,
}
impl CeClassification {
    pub fn from_headers(headers: &Headers) -> Self {
        let machine_type = headers.file_header.machine_type;
        let subsystem = headers.optional_header.subsystem;

        let is_ce_application = subsystem == Subsystem::WindowsCeGui
            || (subsystem == Subsystem::WindowsGui && is_ce_only_architecture(machine_type));

        let major = headers.optional_header.major_subsystem_version;
        let minor = headers.optional_header.minor_subsystem_version;
        let version = if major == 4 && minor == 0 {
            let linked_before_2000 = headers.file_header.time_date_stamp < YEAR_2000_TIMESTAMP;
            let early_architecture = machine_type == MachineType::MipsR4k || machine_type == MachineType::HitachiSh3;
            if linked_before_2000 && early_architecture {
                Some("1.0".to_owned())
            } else {
                None
            }
        } else if minor == 0 {
            Some(format!("{}.{}", major, minor))
        } else {
            Some(format!("{}.{:02}", major, minor))
        };

        Self {
            is_ce_application,
            version,
            architecture: ce_architecture_name(machine_type),
        }
    }
}

/// Whether the machine type is one of the non-x86 architectures Windows CE ran on.
pub fn is_ce_only_architecture(machine_type: MachineType) -> bool {
    matches!(
        machine_type,
        MachineType::Arm
        | MachineType::MipsR4k
        | MachineType::HitachiSh3
        | MachineType::HitachiSh4
        | MachineType::ArmThumb
    )
}

/// The processor family as Windows CE names it.
pub fn ce_architecture_name(machine_type: MachineType) -> &'static str {
    match machine_type {
        MachineType::Arm => "ARM",
        MachineType::ArmThumb => "ARM",
        MachineType::I386 => "X86",
        MachineType::MipsR4k => "MIPS",
        MachineType::HitachiSh3 => "SH3",
        MachineType::HitachiSh4 => "SH4",
        _ => "UNKNOWN",
    }
}
