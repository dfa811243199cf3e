use anyhow::{Context, Result};
use std::fs::File;
use std::io::{Cursor, Write};
use std::path::Path;
use zip::{ZipArchive, ZipWriter};
use zip::write::SimpleFileOptions;

use tracing::info;

/// Builds an archive in memory. Names ending in `/` become directory markers.
pub fn jar_bytes(entries: &[(&str, &[u8])]) -> Result<Vec<u8>> {
    let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
    let options = SimpleFileOptions::default();

    for (name, bytes) in entries {
        if name.ends_with('/') {
            writer
                .add_directory(*name, options)
                .with_context(|| format!("Failed to add directory {name}"))?;
        } else {
            writer
                .start_file(*name, options)
                .with_context(|| format!("Failed to start file {name}"))?;
            writer
                .write_all(bytes)
                .with_context(|| format!("Failed to write file {name}"))?;
        }
    }

    let cursor = writer.finish().context("Failed to finish archive")?;
    Ok(cursor.into_inner())
}

pub fn write_jar(dest_path: &Path, entries: &[(&str, &[u8])]) -> Result<()> {
    info!("Writing {} entries to {:?}", entries.len(), dest_path);

    let bytes = jar_bytes(entries)?;
    let mut file = File::create(dest_path).context("Failed to create destination file")?;
    file.write_all(&bytes)
        .context("Failed to write to destination file")?;

    Ok(())
}

/// Unpacks a jar into `dest_dir`, recreating its directory markers.
pub fn extract_jar(jar_path: &Path, dest_dir: &Path) -> Result<()> {
    info!("Extracting {:?} to {:?}", jar_path, dest_dir);

    let file =
        File::open(jar_path).with_context(|| format!("Failed to open archive {jar_path:?}"))?;
    let mut archive =
        ZipArchive::new(file).with_context(|| format!("Failed to read archive {jar_path:?}"))?;
    archive
        .extract(dest_dir)
        .with_context(|| format!("Failed to extract archive into {dest_dir:?}"))?;

    Ok(())
}
