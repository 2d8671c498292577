//! Local zip packing/unpacking of artifact directories.

use std::fs::File;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};

use walkdir::WalkDir;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

use crate::error::{Error, Result};

/// Zip the contents of `dir` into `out_dir/{dir_basename}.zip`. Entries are
/// rooted at the directory's contents (no wrapping top-level folder), so the
/// server-side unzip of `X.zip` materializes directory `X` holding them.
pub fn pack_dir(dir: &Path, out_dir: &Path) -> Result<PathBuf> {
    let base_name = dir
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .ok_or_else(|| Error::InvalidRecord(format!("{} has no directory name", dir.display())))?;
    let archive_path = out_dir.join(format!("{base_name}.zip"));

    let file = File::create(&archive_path)?;
    let mut writer = ZipWriter::new(file);
    let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);

    let mut buf = Vec::new();
    for entry in WalkDir::new(dir).min_depth(1) {
        let entry = entry.map_err(|e| Error::Io(e.into()))?;
        let rel = entry
            .path()
            .strip_prefix(dir)
            .expect("walkdir yields children of its root")
            .to_string_lossy()
            .replace('\\', "/");
        if entry.file_type().is_dir() {
            writer.add_directory(rel.as_str(), options)?;
        } else {
            writer.start_file(rel.as_str(), options)?;
            buf.clear();
            File::open(entry.path())?.read_to_end(&mut buf)?;
            writer.write_all(&buf)?;
        }
    }
    writer.finish()?;
    Ok(archive_path)
}

/// Extract a zip archive into `dest_dir`.
pub fn unpack(archive_path: &Path, dest_dir: &Path) -> Result<()> {
    let file = File::open(archive_path)?;
    let mut archive = ZipArchive::new(file)?;
    archive.extract(dest_dir)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pack_unpack_round_trip() {
        let src = tempfile::tempdir().unwrap();
        let model_dir = src.path().join("mnist_artifacts");
        std::fs::create_dir(&model_dir).unwrap();
        std::fs::write(model_dir.join("weights.bin"), b"\x00\x01\x02").unwrap();
        std::fs::create_dir(model_dir.join("assets")).unwrap();
        std::fs::write(model_dir.join("assets/vocab.txt"), "hello").unwrap();

        let staging = tempfile::tempdir().unwrap();
        let archive = pack_dir(&model_dir, staging.path()).unwrap();
        assert_eq!(archive.file_name().unwrap(), "mnist_artifacts.zip");

        let dest = tempfile::tempdir().unwrap();
        unpack(&archive, dest.path()).unwrap();
        // entries are rooted at the directory contents
        assert_eq!(
            std::fs::read(dest.path().join("weights.bin")).unwrap(),
            b"\x00\x01\x02"
        );
        assert_eq!(
            std::fs::read_to_string(dest.path().join("assets/vocab.txt")).unwrap(),
            "hello"
        );
    }
}
