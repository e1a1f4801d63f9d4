use std::path::{Path, PathBuf};

use tempfile::TempDir;
use tracing::{debug, info};

use crate::error::DriverError;

/// Copy the definition tree at `source` into a fresh temporary directory and
/// drop the pinning files into its root.
///
/// Skipped while copying:
/// - hidden entries (`.git`, `.terraform`, `.tool-versions`, ...), except the
///   provider lock file and `.terraform-version`; other pinning files are
///   copied explicitly afterwards
/// - `terraform.tfstate` and its backups, so stale local state never leaks in
///
/// The directory is removed when the returned [`TempDir`] is dropped.
pub fn stage_working_copy(source: &Path, pin_files: &[PathBuf]) -> Result<TempDir, DriverError> {
    let dir = tempfile::Builder::new()
        .prefix("tfverify-")
        .tempdir()
        .map_err(|e| DriverError::Staging(format!("create temp dir: {}", e)))?;

    copy_tree(source, dir.path())?;

    for pin in pin_files {
        let name = pin
            .file_name()
            .ok_or_else(|| DriverError::Staging(format!("pin file {:?} has no file name", pin)))?;
        std::fs::copy(pin, dir.path().join(name))
            .map_err(|e| DriverError::Staging(format!("copy pin file {:?}: {}", pin, e)))?;
    }

    info!(
        source = %source.display(),
        working_dir = %dir.path().display(),
        pins = pin_files.len(),
        "staged working copy"
    );
    Ok(dir)
}

fn copy_tree(from: &Path, to: &Path) -> Result<(), DriverError> {
    let entries = std::fs::read_dir(from)
        .map_err(|e| DriverError::Staging(format!("read dir {:?}: {}", from, e)))?;

    for entry in entries {
        let entry = entry.map_err(|e| DriverError::Staging(e.to_string()))?;
        let name = entry.file_name();
        if should_skip(&name.to_string_lossy()) {
            continue;
        }
        let src = entry.path();
        let dst = to.join(&name);
        // Follow symlinks: the copy must not point back into the source tree.
        let meta = std::fs::metadata(&src)
            .map_err(|e| DriverError::Staging(format!("stat {:?}: {}", src, e)))?;

        if meta.is_dir() {
            std::fs::create_dir_all(&dst)
                .map_err(|e| DriverError::Staging(format!("create {:?}: {}", dst, e)))?;
            copy_tree(&src, &dst)?;
        } else {
            debug!(file = %src.display(), "staging file");
            std::fs::copy(&src, &dst)
                .map_err(|e| DriverError::Staging(format!("copy {:?} → {:?}: {}", src, dst, e)))?;
        }
    }
    Ok(())
}

/// Hidden files that pin versions and must travel with the tree.
const KEPT_DOTFILES: [&str; 2] = [".terraform.lock.hcl", ".terraform-version"];

fn should_skip(name: &str) -> bool {
    if KEPT_DOTFILES.contains(&name) {
        return false;
    }
    name.starts_with('.') || name.starts_with("terraform.tfstate")
}
