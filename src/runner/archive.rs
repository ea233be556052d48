//! Tar staging for copying host files into the container.
//!
//! The daemon only accepts tar archives extracted into an existing directory,
//! so a copy to `/a/b/file` becomes an archive holding a single entry `file`
//! uploaded into `/a/b`.
//!
//! The destination is assumed not to exist. If it is already a directory in
//! the container, the entry lands next to it under the same name rather than
//! inside it.

use std::path::Path;

use bytes::Bytes;

use crate::error::ArchiveError;

/// An archive ready to upload, and the directory to extract it into.
#[derive(Debug, Clone)]
pub struct PreparedArchive {
    pub dest_dir: String,
    pub entry_name: String,
    pub archive: Bytes,
}

/// Archive `source` so that extracting it into the returned directory
/// produces `destination`.
pub fn prepare_copy(source: &Path, destination: &str) -> Result<PreparedArchive, ArchiveError> {
    let metadata = std::fs::metadata(source).map_err(|e| ArchiveError::SourceInfo {
        path: source.to_path_buf(),
        source: e,
    })?;

    let (dest_dir, entry_name) = split_destination(destination)?;

    let mut builder = tar::Builder::new(Vec::new());
    if metadata.is_file() {
        builder.append_path_with_name(source, entry_name)?;
    } else if metadata.is_dir() {
        builder.append_dir_all(entry_name, source)?;
    } else {
        return Err(ArchiveError::UnsupportedSource {
            path: source.to_path_buf(),
        });
    }
    let archive = builder.into_inner()?;

    tracing::trace!(
        source = %source.display(),
        dest_dir,
        bytes = archive.len(),
        "prepared copy archive"
    );

    Ok(PreparedArchive {
        dest_dir: dest_dir.to_string(),
        entry_name: entry_name.to_string(),
        archive: Bytes::from(archive),
    })
}

/// Split an absolute container path into its parent directory and file name.
fn split_destination(destination: &str) -> Result<(&str, &str), ArchiveError> {
    let invalid = || ArchiveError::InvalidDestination(destination.to_string());

    if !destination.starts_with('/') {
        return Err(invalid());
    }
    let (dir, name) = destination.rsplit_once('/').ok_or_else(invalid)?;
    if name.is_empty() || name == "." || name == ".." {
        return Err(invalid());
    }

    Ok((if dir.is_empty() { "/" } else { dir }, name))
}
