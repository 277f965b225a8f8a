//! Ephemeral per-build workspaces and skeleton extraction.

mod locator;

pub use locator::{
    DEFAULT_MAX_DEPTH, DirTree, FsTree, Marker, find_root, locate_project_root,
};

use std::fs;
use std::io::Cursor;
use std::path::{Path, PathBuf};

use chrono::Utc;
use flate2::read::GzDecoder;

use crate::error::BuildError;
use crate::platform::ArchiveFormat;

/// A temporary directory owned by exactly one build execution.
///
/// The directory is removed when the value is dropped, on success and
/// failure alike. Removal errors are logged and never returned.
#[derive(Debug)]
pub struct Workspace {
    path: PathBuf,
}

impl Workspace {
    /// Create `webforge-{build_id}-{millis}` under `temp_root`.
    pub fn create(temp_root: &Path, build_id: &str) -> Result<Self, BuildError> {
        fs::create_dir_all(temp_root)?;
        let base = format!(
            "webforge-{}-{}",
            sanitize(build_id),
            Utc::now().timestamp_millis()
        );
        // Two runs of one build in the same millisecond get a suffix.
        let mut path = temp_root.join(&base);
        let mut attempt = 1;
        loop {
            match fs::create_dir(&path) {
                Ok(()) => break,
                Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists && attempt < 100 => {
                    path = temp_root.join(format!("{base}-{attempt}"));
                    attempt += 1;
                }
                Err(e) => return Err(e.into()),
            }
        }
        tracing::debug!(workspace = %path.display(), "created workspace");
        Ok(Self { path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Unpack a skeleton archive into the workspace.
    pub fn extract(&self, bytes: &[u8], format: ArchiveFormat) -> Result<(), BuildError> {
        extract_archive(bytes, format, &self.path)
    }
}

impl Drop for Workspace {
    fn drop(&mut self) {
        match fs::remove_dir_all(&self.path) {
            Ok(()) => tracing::debug!(workspace = %self.path.display(), "removed workspace"),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => tracing::warn!(
                workspace = %self.path.display(),
                error = %e,
                "failed to remove workspace"
            ),
        }
    }
}

fn sanitize(id: &str) -> String {
    let cleaned: String = id
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
        .take(64)
        .collect();
    if cleaned.is_empty() {
        "build".to_string()
    } else {
        cleaned
    }
}

/// Unpack `bytes` into `dest`. Entries that would escape `dest` are refused
/// by the archive readers.
pub fn extract_archive(bytes: &[u8], format: ArchiveFormat, dest: &Path) -> Result<(), BuildError> {
    match format {
        ArchiveFormat::Zip => {
            let mut archive = zip::ZipArchive::new(Cursor::new(bytes)).map_err(|e| {
                BuildError::InvalidSkeletonStructure(format!("not a zip archive: {e}"))
            })?;
            archive.extract(dest).map_err(|e| {
                BuildError::InvalidSkeletonStructure(format!("failed to extract zip: {e}"))
            })?;
        }
        ArchiveFormat::TarGz => {
            let decoder = GzDecoder::new(Cursor::new(bytes));
            let mut archive = tar::Archive::new(decoder);
            archive.set_preserve_permissions(true);
            archive.unpack(dest).map_err(|e| {
                BuildError::InvalidSkeletonStructure(format!("failed to extract tar.gz: {e}"))
            })?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::TempDir;
    use zip::write::SimpleFileOptions;

    fn zip_with(files: &[(&str, &str)]) -> Vec<u8> {
        let mut writer = zip::ZipWriter::new(Cursor::new(Vec::new()));
        for (name, body) in files {
            writer.start_file(*name, SimpleFileOptions::default()).unwrap();
            writer.write_all(body.as_bytes()).unwrap();
        }
        writer.finish().unwrap().into_inner()
    }

    fn tar_gz_with(files: &[(&str, &str)]) -> Vec<u8> {
        let encoder = flate2::write::GzEncoder::new(Vec::new(), flate2::Compression::default());
        let mut builder = tar::Builder::new(encoder);
        for (name, body) in files {
            let mut header = tar::Header::new_gnu();
            header.set_size(body.len() as u64);
            header.set_mode(0o644);
            header.set_cksum();
            builder.append_data(&mut header, name, body.as_bytes()).unwrap();
        }
        builder.into_inner().unwrap().finish().unwrap()
    }

    #[test]
    fn workspace_is_unique_and_removed_on_drop() {
        let root = TempDir::new().unwrap();
        let a = Workspace::create(root.path(), "job/1").unwrap();
        let b = Workspace::create(root.path(), "job/1").unwrap();
        assert_ne!(a.path(), b.path());
        assert!(a.path().is_dir());
        let name = a.path().file_name().unwrap().to_string_lossy().into_owned();
        assert!(name.starts_with("webforge-job_1-"));

        let path = a.path().to_path_buf();
        fs::write(path.join("scratch.txt"), "x").unwrap();
        drop(a);
        assert!(!path.exists());
        drop(b);
        assert_eq!(fs::read_dir(root.path()).unwrap().count(), 0);
    }

    #[test]
    fn extracts_zip_and_tar_gz() {
        let root = TempDir::new().unwrap();
        let ws = Workspace::create(root.path(), "x").unwrap();
        ws.extract(&zip_with(&[("pkg/manifest.json", "{}")]), ArchiveFormat::Zip)
            .unwrap();
        assert!(ws.path().join("pkg/manifest.json").is_file());

        ws.extract(&tar_gz_with(&[("linux/install.sh", "#!/bin/sh")]), ArchiveFormat::TarGz)
            .unwrap();
        assert_eq!(
            fs::read_to_string(ws.path().join("linux/install.sh")).unwrap(),
            "#!/bin/sh"
        );
    }

    #[test]
    fn garbage_is_invalid_skeleton() {
        let root = TempDir::new().unwrap();
        let ws = Workspace::create(root.path(), "x").unwrap();
        let err = ws.extract(b"definitely not a zip", ArchiveFormat::Zip).unwrap_err();
        assert!(matches!(err, BuildError::InvalidSkeletonStructure(_)));
        let err = ws.extract(b"nor a tarball", ArchiveFormat::TarGz).unwrap_err();
        assert!(matches!(err, BuildError::InvalidSkeletonStructure(_)));
    }
}
