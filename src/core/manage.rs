use std::{
    fs::{self, File, OpenOptions},
    io::{self, Read, Seek},
    path::{Path, PathBuf},
};

use crate::error::ModsyncError;

use zip::ZipArchive;

use tracing::{debug, error, info, trace};

/// Extract every entry of a zip archive into `target_dir`, keeping the archive's directory layout
///
/// Entries that would escape `target_dir` are skipped. Existing files are overwritten.
///
/// Returns the number of files written
pub fn extract_archive(
    zip_file: impl Read + Seek,
    target_dir: impl AsRef<Path>,
) -> Result<usize, ModsyncError> {
    let target_dir = target_dir.as_ref();
    let mut archive = ZipArchive::new(zip_file)?;
    let mut written = 0;

    for i in 0..archive.len() {
        let mut file = archive.by_index(i)?;
        let Some(name) = file.enclosed_name() else {
            trace!("Skip unsafe entry '{}'", file.name());
            continue;
        };
        let out = target_dir.join(name);

        if file.is_dir() {
            trace!("Creating dir {}", out.display());
            fs::create_dir_all(&out)?;
            continue;
        } else if let Some(p) = out.parent() {
            fs::create_dir_all(p)?;
        }

        trace!("Write file {}", out.display());
        let mut outfile = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(&out)?;
        io::copy(&mut file, &mut outfile)?;
        written += 1;
    }

    Ok(written)
}

/// Extract all `.zip` files found directly inside `source_dir` into `target_dir`
///
/// Archives are handled in name order. One that can't be read is logged and skipped.
///
/// Returns the paths of the archives that were extracted
pub fn extract_archives(
    source_dir: impl AsRef<Path>,
    target_dir: impl AsRef<Path>,
) -> Result<Vec<PathBuf>, ModsyncError> {
    let target_dir = target_dir.as_ref();
    let mut archives = fs::read_dir(source_dir.as_ref())?
        .filter_map(|e| e.ok().map(|e| e.path()))
        .filter(|p| p.is_file() && is_zip(p))
        .collect::<Vec<_>>();
    archives.sort();

    let mut extracted = vec![];
    for path in archives {
        let res = File::open(&path)
            .map_err(ModsyncError::from)
            .and_then(|f| extract_archive(f, target_dir));
        match res {
            Ok(count) => {
                info!(
                    "Extracted {} ({} files)",
                    path.file_name().unwrap_or_default().to_string_lossy(),
                    count
                );
                extracted.push(path);
            }
            Err(e) => error!("Error extracting {}: {}", path.display(), e),
        }
    }

    debug!("Extracted {} archives into {}", extracted.len(), target_dir.display());
    Ok(extracted)
}

pub(crate) fn is_zip(path: &Path) -> bool {
    path.extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("zip"))
}
