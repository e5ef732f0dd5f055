use std::fs::{self, File};
use std::io::{self, Write};
use std::path::Path;

use zip::ZipWriter;
use zip::write::SimpleFileOptions;

use crate::error::MapError;

/// Archives a directory tree into a zip file, entry names relative to the
/// directory root.
pub fn zip_dir(source_dir: &Path, zip_path: &Path) -> Result<(), MapError> {
    let file = File::create(zip_path).map_err(|err| {
        MapError::Filesystem(format!("create zip {}: {err}", zip_path.display()))
    })?;
    let mut writer = ZipWriter::new(file);
    let options = SimpleFileOptions::default();

    let mut stack = vec![source_dir.to_path_buf()];
    while let Some(dir) = stack.pop() {
        let entries = fs::read_dir(&dir).map_err(|err| MapError::Filesystem(err.to_string()))?;
        for entry in entries {
            let entry = entry.map_err(|err| MapError::Filesystem(err.to_string()))?;
            let path = entry.path();
            let relative = path
                .strip_prefix(source_dir)
                .map_err(|err| MapError::Filesystem(err.to_string()))?
                .to_string_lossy()
                .replace('\\', "/");
            if path.is_dir() {
                writer
                    .add_directory(relative, options)
                    .map_err(|err| MapError::Filesystem(err.to_string()))?;
                stack.push(path);
            } else {
                writer
                    .start_file(relative, options)
                    .map_err(|err| MapError::Filesystem(err.to_string()))?;
                let mut input =
                    File::open(&path).map_err(|err| MapError::Filesystem(err.to_string()))?;
                io::copy(&mut input, &mut writer)
                    .map_err(|err| MapError::Filesystem(err.to_string()))?;
            }
        }
    }

    writer
        .finish()
        .map_err(|err| MapError::Filesystem(err.to_string()))?
        .flush()
        .map_err(|err| MapError::Filesystem(err.to_string()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use zip::ZipArchive;

    use super::*;

    #[test]
    fn zips_nested_directory() {
        let temp = tempfile::tempdir().unwrap();
        let source = temp.path().join("SRR000001");
        fs::create_dir_all(source.join("nested")).unwrap();
        fs::write(source.join("reads.fastq.gz"), b"data").unwrap();
        fs::write(source.join("nested/more.txt"), b"more").unwrap();

        let zip_path = temp.path().join("SRR000001.zip");
        zip_dir(&source, &zip_path).unwrap();

        let archive = ZipArchive::new(File::open(&zip_path).unwrap()).unwrap();
        let names: Vec<&str> = archive.file_names().collect();
        assert!(names.contains(&"reads.fastq.gz"));
        assert!(names.contains(&"nested/more.txt"));
    }
}
