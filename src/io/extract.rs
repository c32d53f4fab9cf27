//! Archive extraction
//!
//! Source distributions arrive as gzipped tarballs; extraction is a
//! blocking operation and callers run it on the blocking pool.

use std::fs::{self, File};
use std::io::{self, BufReader, Read};
use std::path::{Path, PathBuf};

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ExtractError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("unsupported archive format: {0}")]
    UnsupportedFormat(String),

    #[error("archive error: {0}")]
    Archive(String),
}

/// Extract a source archive into a destination directory.
///
/// The format is detected from `declared_name` (the source url or file
/// name) rather than from `archive_path`: cached archives are keyed by
/// digest and carry no extension.
pub fn extract_auto(
    archive_path: &Path,
    declared_name: &str,
    dest_dir: &Path,
) -> Result<(), ExtractError> {
    let name = declared_name.to_lowercase();

    if name.ends_with(".tar.gz") || name.ends_with(".tgz") {
        extract_tar_gz(archive_path, dest_dir)
    } else if name.ends_with(".tar") {
        let file = File::open(archive_path)?;
        extract_tar(BufReader::new(file), dest_dir)
    } else {
        Err(ExtractError::UnsupportedFormat(name))
    }
}

/// Extract a tar.gz archive to a destination directory.
pub fn extract_tar_gz(archive_path: &Path, dest_dir: &Path) -> Result<(), ExtractError> {
    let file = File::open(archive_path)?;
    let reader = BufReader::new(file);
    let gz_decoder = flate2::read::GzDecoder::new(reader);

    extract_tar(gz_decoder, dest_dir)
}

/// Extract a tar archive from a reader.
fn extract_tar<R: Read>(reader: R, dest_dir: &Path) -> Result<(), ExtractError> {
    fs::create_dir_all(dest_dir)?;

    let mut archive = tar::Archive::new(reader);
    archive.set_preserve_permissions(true);

    for entry in archive.entries()? {
        let mut entry = entry?;
        let entry_path = entry.path()?;
        let relative_path: PathBuf = entry_path.components().collect();

        let absolute_path = dest_dir.join(&relative_path);

        // Sanitize path to prevent escape via ../ entries
        if !absolute_path.starts_with(dest_dir) {
            return Err(ExtractError::Archive(format!(
                "invalid path in archive: {}",
                relative_path.display()
            )));
        }

        if let Some(parent) = absolute_path.parent() {
            fs::create_dir_all(parent)?;
        }

        entry.unpack(&absolute_path)?;
    }

    Ok(())
}

/// Detect if a directory has a single top-level directory and strip it by
/// moving its contents up. Release tarballs conventionally wrap everything
/// in `name-version/`.
pub fn strip_components(dir: &Path) -> io::Result<()> {
    let mut entries: Vec<_> = fs::read_dir(dir)?.filter_map(|e| e.ok()).collect();

    // Hidden files (like .DS_Store) don't count
    entries.retain(|e| !e.file_name().to_string_lossy().starts_with('.'));

    if entries.len() == 1 && entries[0].file_type()?.is_dir() {
        let top_level = entries[0].path();
        let sub_entries: Vec<_> = fs::read_dir(&top_level)?.filter_map(|e| e.ok()).collect();

        for entry in sub_entries {
            let target = dir.join(entry.file_name());
            fs::rename(entry.path(), target)?;
        }

        fs::remove_dir(top_level)?;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Build a small gzipped tarball in memory.
    fn make_tar_gz(dest: &Path, files: &[(&str, &str)]) {
        let file = File::create(dest).unwrap();
        let encoder = flate2::write::GzEncoder::new(file, flate2::Compression::default());
        let mut builder = tar::Builder::new(encoder);

        for (path, content) in files {
            let mut header = tar::Header::new_gnu();
            header.set_size(content.len() as u64);
            header.set_mode(0o644);
            header.set_cksum();
            builder.append_data(&mut header, path, content.as_bytes()).unwrap();
        }

        builder.into_inner().unwrap().finish().unwrap();
    }

    #[test]
    fn extracts_tar_gz_tree() {
        let dir = tempfile::tempdir().unwrap();
        let archive = dir.path().join("src.tar.gz");
        make_tar_gz(
            &archive,
            &[
                ("pkg-1.0/Cargo.toml", "[package]"),
                ("pkg-1.0/src/main.rs", "fn main() {}"),
            ],
        );

        let dest = dir.path().join("out");
        extract_auto(&archive, "src.tar.gz", &dest).unwrap();

        assert!(dest.join("pkg-1.0/Cargo.toml").exists());
        assert!(dest.join("pkg-1.0/src/main.rs").exists());
    }

    #[test]
    fn detects_format_from_declared_name_not_path() {
        let dir = tempfile::tempdir().unwrap();
        // Cache entries are digest-keyed and extensionless.
        let archive = dir.path().join("a1b2c3");
        make_tar_gz(&archive, &[("pkg/readme", "hi")]);

        let dest = dir.path().join("out");
        extract_auto(&archive, "https://example.com/pkg.tar.gz", &dest).unwrap();
        assert!(dest.join("pkg/readme").exists());
    }

    #[test]
    fn rejects_unknown_format() {
        let dir = tempfile::tempdir().unwrap();
        let archive = dir.path().join("blob.zip");
        fs::write(&archive, b"not a tarball").unwrap();

        let err = extract_auto(&archive, "blob.zip", &dir.path().join("out")).unwrap_err();
        assert!(matches!(err, ExtractError::UnsupportedFormat(_)));
    }

    #[test]
    fn strip_components_flattens_single_dir() {
        let dir = tempfile::tempdir().unwrap();
        let nested = dir.path().join("pkg-1.0");
        fs::create_dir(&nested).unwrap();
        fs::write(nested.join("file.txt"), "content").unwrap();

        strip_components(dir.path()).unwrap();

        assert!(dir.path().join("file.txt").exists());
        assert!(!dir.path().join("pkg-1.0").exists());
    }

    #[test]
    fn strip_components_ignores_hidden_files() {
        let dir = tempfile::tempdir().unwrap();
        let nested = dir.path().join("pkg-1.0");
        fs::create_dir(&nested).unwrap();
        fs::write(nested.join("file.txt"), "content").unwrap();
        fs::write(dir.path().join(".DS_Store"), "junk").unwrap();

        strip_components(dir.path()).unwrap();

        assert!(dir.path().join("file.txt").exists());
        assert!(dir.path().join(".DS_Store").exists());
    }

    #[test]
    fn strip_components_leaves_flat_dirs_alone() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("a.txt"), "a").unwrap();
        fs::write(dir.path().join("b.txt"), "b").unwrap();

        strip_components(dir.path()).unwrap();

        assert!(dir.path().join("a.txt").exists());
        assert!(dir.path().join("b.txt").exists());
    }
}
