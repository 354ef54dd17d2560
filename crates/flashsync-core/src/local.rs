// Local log directory

use std::path::{Path, PathBuf};

use tracing::trace;

use flashsync_api::LogName;

/// A downloaded log in the local directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalFile {
    pub name: LogName,
    pub path: PathBuf,
}

/// Suffix for in-flight downloads; never treated as a log.
pub const PART_SUFFIX: &str = ".part";

/// Log files in `dir`, oldest first.
///
/// In-flight `.part` files and anything not named like a log are ignored.
/// A missing directory has no files.
pub fn local_log_files(dir: &Path) -> std::io::Result<Vec<LocalFile>> {
    let entries = match std::fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(e),
    };

    let mut files = Vec::new();
    for entry in entries {
        let entry = entry?;
        if !entry.file_type()?.is_file() {
            continue;
        }
        let Some(file_name) = entry.file_name().to_str().map(str::to_owned) else {
            continue;
        };
        match LogName::parse(file_name) {
            Ok(name) => files.push(LocalFile {
                name,
                path: entry.path(),
            }),
            Err(e) => trace!(file = %e.0, "skipping non-log file"),
        }
    }
    files.sort_by(|a, b| a.name.cmp(&b.name));
    Ok(files)
}

/// Temporary path a download of `name` is written to before the rename.
pub fn part_path(dir: &Path, name: &LogName) -> PathBuf {
    dir.join(format!(".{name}{PART_SUFFIX}"))
}
