//! Bundle files on disk: one `<YYYY-MM-DD>.json` per date.
//!
//! Writes go through a temp file and a rename, so a regenerated bundle
//! replaces the previous one in a single step and readers never see a
//! half-written file.

use std::path::{Path, PathBuf};

use lectio_shared::{AugmentedBundle, LectioError, Result};
use tracing::debug;

/// Where the bundle for `bundle.date` lives under `out_dir`.
pub fn bundle_path(out_dir: &Path, bundle: &AugmentedBundle) -> PathBuf {
    out_dir.join(format!("{}.json", bundle.date.format("%Y-%m-%d")))
}

/// Write `bundle` under `out_dir`, replacing any bundle for the same date.
pub fn write_bundle(out_dir: &Path, bundle: &AugmentedBundle) -> Result<PathBuf> {
    std::fs::create_dir_all(out_dir).map_err(|e| LectioError::io(out_dir, e))?;

    let path = bundle_path(out_dir, bundle);
    let json = serde_json::to_string_pretty(bundle)
        .map_err(|e| LectioError::validation(format!("JSON serialization failed: {e}")))?;

    let temp = path.with_extension(format!("json.{}.tmp", bundle.bundle_id));
    std::fs::write(&temp, json).map_err(|e| LectioError::io(&temp, e))?;
    if let Err(e) = std::fs::rename(&temp, &path) {
        let _ = std::fs::remove_file(&temp);
        return Err(LectioError::io(&path, e));
    }

    debug!(path = %path.display(), status = %bundle.status(), "wrote bundle");
    Ok(path)
}

pub fn read_bundle(path: &Path) -> Result<AugmentedBundle> {
    let raw = std::fs::read_to_string(path).map_err(|e| LectioError::io(path, e))?;
    serde_json::from_str(&raw)
        .map_err(|e| LectioError::parse(format!("bundle {}: {e}", path.display())))
}
