//! ZIP bundles of cart records

use chrono::NaiveDate;
use std::collections::HashSet;
use std::io::Cursor;
use std::path::Path;
use tracing::{debug, info, warn};
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

use crate::error::{MediaError, Result};
use crate::media::MediaRecord;
use crate::paths::PathResolver;

/// Archive ready to hand to the client
#[derive(Debug)]
pub struct CartBundle {
    /// `media_YYYY_MM_DD.zip`
    pub file_name: String,
    pub bytes: Vec<u8>,
    /// Identifiers whose files went into the archive
    pub added: Vec<String>,
    /// Identifiers whose files were not on disk
    pub missing: Vec<String>,
}

pub fn bundle_name(date: NaiveDate) -> String {
    format!("media_{}.zip", date.format("%Y_%m_%d"))
}

/// Zip the files behind `records`, each under its base name.
///
/// Records whose file is missing are skipped; `NotFound` when none exist.
pub fn build_bundle(resolver: &PathResolver, records: &[MediaRecord], date: NaiveDate) -> Result<CartBundle> {
    let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
    let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);

    let mut names = HashSet::new();
    let mut added = Vec::new();
    let mut missing = Vec::new();

    for record in records {
        let absolute = match resolver.resolve(&record.file_path) {
            Ok(resolved) if resolved.absolute.is_file() => resolved.absolute,
            Ok(resolved) => {
                debug!("Cart file missing on disk: {}", resolved.absolute.display());
                missing.push(record.file_id.clone());
                continue;
            }
            Err(e) => {
                warn!("⚠️ Skipping {} in cart bundle: {}", record.file_id, e);
                missing.push(record.file_id.clone());
                continue;
            }
        };

        let mut file = std::fs::File::open(&absolute)
            .map_err(|e| MediaError::io(format!("reading {}", absolute.display()), e))?;
        writer
            .start_file(entry_name(&mut names, &absolute), options)
            .map_err(zip_error)?;
        std::io::copy(&mut file, &mut writer).map_err(|e| MediaError::io("writing the cart archive", e))?;
        added.push(record.file_id.clone());
    }

    if added.is_empty() {
        return Err(MediaError::NotFound(format!(
            "none of the {} selected files exist on disk",
            records.len()
        )));
    }

    let bytes = writer.finish().map_err(zip_error)?.into_inner();
    info!("🗜️ Bundled {} cart files ({} missing)", added.len(), missing.len());

    Ok(CartBundle {
        file_name: bundle_name(date),
        bytes,
        added,
        missing,
    })
}

/// Base name of `path`, suffixed `_1`, `_2`, ... when already used
fn entry_name(used: &mut HashSet<String>, path: &Path) -> String {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "file".to_string());
    if used.insert(name.clone()) {
        return name;
    }

    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| name.clone());
    let extension = path.extension().map(|e| e.to_string_lossy().into_owned());
    (1u32..)
        .map(|n| match &extension {
            Some(ext) => format!("{}_{}.{}", stem, n, ext),
            None => format!("{}_{}", stem, n),
        })
        .find(|candidate| used.insert(candidate.clone()))
        .unwrap_or(name)
}

fn zip_error(e: zip::result::ZipError) -> MediaError {
    MediaError::io("building the cart archive", std::io::Error::other(e))
}
