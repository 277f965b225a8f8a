//! Repackaging a patched project tree into the output archive.

use std::fs::{self, File};
use std::io::{self, Cursor, Write};
use std::path::Path;

use flate2::Compression;
use flate2::write::GzEncoder;
use walkdir::WalkDir;
use zip::CompressionMethod;
use zip::ZipWriter;
use zip::write::SimpleFileOptions;

use crate::error::BuildError;
use crate::platform::{ArchiveFormat, Platform};

pub const MODE_EXECUTABLE: u32 = 0o755;
pub const MODE_REGULAR: u32 = 0o644;

/// Unix mode an entry is archived with.
///
/// `rel` is the entry path relative to the archive root, `/`-separated.
pub fn entry_mode(platform: Platform, rel: &str, is_dir: bool) -> u32 {
    if is_dir {
        return MODE_EXECUTABLE;
    }
    let file_name = rel.rsplit('/').next().unwrap_or(rel);
    let is_install_script = file_name.ends_with(".sh") || is_installer(file_name);
    let is_launcher = platform.launcher_names().contains(&file_name)
        || (platform == Platform::Linux && !rel.contains('/') && !file_name.contains('.'));
    let in_bundle_binaries = rel.contains(".app/Contents/MacOS/");

    if is_install_script || is_launcher || in_bundle_binaries {
        MODE_EXECUTABLE
    } else {
        MODE_REGULAR
    }
}

/// `install` or `installer`, bare or with a runnable extension.
fn is_installer(file_name: &str) -> bool {
    const RUNNABLE: [&str; 6] = ["sh", "run", "bin", "exe", "bat", "cmd"];
    let (stem, extension) = match file_name.split_once('.') {
        Some((stem, extension)) => (stem, Some(extension)),
        None => (file_name, None),
    };
    matches!(stem, "install" | "installer")
        && extension.is_none_or(|e| RUNNABLE.contains(&e))
}

/// Archive everything under `root` in the platform's output format.
pub fn package(platform: Platform, root: &Path) -> Result<Vec<u8>, BuildError> {
    let result = match platform.archive_format() {
        ArchiveFormat::Zip => write_zip(platform, root),
        ArchiveFormat::TarGz => write_tar_gz(platform, root),
    };
    let bytes = result.map_err(|e| BuildError::Repackaging(e.to_string()))?;
    tracing::info!(platform = %platform, bytes = bytes.len(), "packaged output archive");
    Ok(bytes)
}

struct Entry {
    path: std::path::PathBuf,
    rel: String,
    kind: EntryKind,
}

enum EntryKind {
    Dir,
    File,
    Symlink,
}

/// Every entry below `root` in file-name order, root itself excluded.
fn entries(root: &Path) -> io::Result<Vec<Entry>> {
    let mut out = Vec::new();
    for entry in WalkDir::new(root).min_depth(1).sort_by_file_name() {
        let entry = entry.map_err(io::Error::other)?;
        let rel = entry
            .path()
            .strip_prefix(root)
            .map_err(io::Error::other)?
            .to_string_lossy()
            .replace('\\', "/");
        let file_type = entry.file_type();
        let kind = if file_type.is_symlink() {
            EntryKind::Symlink
        } else if file_type.is_dir() {
            EntryKind::Dir
        } else {
            EntryKind::File
        };
        out.push(Entry {
            path: entry.into_path(),
            rel,
            kind,
        });
    }
    Ok(out)
}

fn write_zip(platform: Platform, root: &Path) -> io::Result<Vec<u8>> {
    let mut zip = ZipWriter::new(Cursor::new(Vec::new()));
    let base = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);

    for entry in entries(root)? {
        match entry.kind {
            EntryKind::Dir => {
                let options = base.unix_permissions(entry_mode(platform, &entry.rel, true));
                zip.add_directory(format!("{}/", entry.rel), options)
                    .map_err(io::Error::other)?;
            }
            EntryKind::Symlink => {
                let target = fs::read_link(&entry.path)?;
                zip.add_symlink(entry.rel.as_str(), target.to_string_lossy(), base)
                    .map_err(io::Error::other)?;
            }
            EntryKind::File => {
                let options = base.unix_permissions(entry_mode(platform, &entry.rel, false));
                zip.start_file(entry.rel.as_str(), options)
                    .map_err(io::Error::other)?;
                io::copy(&mut File::open(&entry.path)?, &mut zip)?;
            }
        }
    }
    let cursor = zip.finish().map_err(io::Error::other)?;
    Ok(cursor.into_inner())
}

fn tar_header(kind: tar::EntryType, size: u64, mode: u32) -> tar::Header {
    let mut header = tar::Header::new_gnu();
    header.set_entry_type(kind);
    header.set_size(size);
    header.set_mtime(0);
    header.set_uid(0);
    header.set_gid(0);
    header.set_mode(mode);
    header
}

fn write_tar_gz(platform: Platform, root: &Path) -> io::Result<Vec<u8>> {
    let encoder = GzEncoder::new(Vec::new(), Compression::default());
    let mut builder = tar::Builder::new(encoder);

    for entry in entries(root)? {
        match entry.kind {
            EntryKind::Dir => {
                let mode = entry_mode(platform, &entry.rel, true);
                let mut header = tar_header(tar::EntryType::Directory, 0, mode);
                header.set_cksum();
                builder.append_data(&mut header, &entry.rel, io::empty())?;
            }
            EntryKind::Symlink => {
                let target = fs::read_link(&entry.path)?;
                let mut header = tar_header(tar::EntryType::Symlink, 0, 0o777);
                header.set_link_name(&target)?;
                header.set_cksum();
                builder.append_data(&mut header, &entry.rel, io::empty())?;
            }
            EntryKind::File => {
                let mut file = File::open(&entry.path)?;
                let size = file.metadata()?.len();
                let mode = entry_mode(platform, &entry.rel, false);
                let mut header = tar_header(tar::EntryType::Regular, size, mode);
                header.set_cksum();
                builder.append_data(&mut header, &entry.rel, &mut file)?;
            }
        }
    }

    let mut encoder = builder.into_inner()?;
    encoder.flush()?;
    encoder.finish()
}
