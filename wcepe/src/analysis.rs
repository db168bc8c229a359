//! Running all decoders over an image.


use tracing::{debug, warn};

use crate::{ByteSource, Error, LossyDecoder, TextDecoder};
use crate::ce::CeClassification;
use crate::import::{ImportTableDecoder, ImportedModule};
use crate::pe::{Headers, KnownDataDirectoryEntry};
use crate::resource::{DEFAULT_MAX_RESOURCE_DEPTH, ResourceWalker, version_predicate};
use crate::version::{VersionInfo, VersionInfoDecoder};


/// Everything extracted from an image.
///
/// The headers are always present; the version information and the imports are decoded
/// independently, and a failure in one does not affect the other. `Ok(None)` means the image
/// does not contain the respective table.
#[derive(Debug)]
pub struct Analysis {
    pub headers: Headers,
    pub version_info: Result<Option<VersionInfo>, Error>,
    pub imports: Result<Option<Vec<ImportedModule>>, Error>,
}
impl Analysis {
    pub fn ce_classification(&self) -> CeClassification {
        CeClassification::from_headers(&self.headers)
    }
}


/// Analyzes an image, decoding strings with [`LossyDecoder`].
pub fn analyze<S: ByteSource + ?Sized>(source: &S) -> Result<Analysis, Error> {
    analyze_with(source, &LossyDecoder)
}

/// Analyzes an image.
///
/// Fails only if the headers cannot be read.
pub fn analyze_with<S: ByteSource + ?Sized, D: TextDecoder + ?Sized>(source: &S, decoder: &D) -> Result<Analysis, Error> {
    let headers = Headers::read(source)?;
    debug!(
        "{} image with {} sections, subsystem {}",
        headers.file_header.machine_type.name(),
        headers.file_header.section_count,
        headers.optional_header.subsystem.name(),
    );
    for known_entry in KnownDataDirectoryEntry::ALL {
        let entry = headers.data_directory(known_entry);
        if !entry.is_empty() {
            debug!("data directory {:?}: RVA {:#010X}, {} bytes", known_entry, entry.address, entry.size);
        }
    }

    let version_info = read_version_info(source, decoder, &headers);
    if let Err(e) = &version_info {
        warn!("failed to decode version information: {}", e);
    }

    let import_decoder = ImportTableDecoder::new(source, decoder, headers.resolver());
    let imports = import_decoder.decode(&headers.data_directory(KnownDataDirectoryEntry::ImportTable));
    if let Err(e) = &imports {
        warn!("failed to decode imports: {}", e);
    }

    Ok(Analysis {
        headers,
        version_info,
        imports,
    })
}

fn read_version_info<S: ByteSource + ?Sized, D: TextDecoder + ?Sized>(source: &S, decoder: &D, headers: &Headers) -> Result<Option<VersionInfo>, Error> {
    let Some(walker) = ResourceWalker::from_headers(source, decoder, headers)? else {
        return Ok(None);
    };
    let leaves = walker.find(version_predicate, DEFAULT_MAX_RESOURCE_DEPTH)?;
    // a later version resource replaces an earlier one
    let Some(leaf) = leaves.last() else {
        debug!("image has no version resource");
        return Ok(None);
    };
    if leaves.len() > 1 {
        debug!("image has {} version resources; decoding the last one", leaves.len());
    }

    let version_decoder = VersionInfoDecoder::from_resource(source, decoder, &leaf.entry, &headers.resolver())?;
    let version_info = version_decoder.decode()?;
    Ok(Some(version_info))
}
