//! Filesystem and process-level helpers
//!

use camino::Utf8Path;

/// Create a directory path, together with any missing parents
///
/// An already-existing directory is left as is.
///
/// * `label` - names the directory's role in the panic message
///
pub fn create_dir_all(dir: &Utf8Path, label: &str) {
    if dir.is_dir() {
        return;
    }
    if let Err(e) = std::fs::create_dir_all(dir) {
        panic!("Failed to create {label} directory '{dir}': {e}");
    }
}

/// Raise the soft open-file limit to the hard limit where the platform allows it
///
/// Best effort only, every failure mode is ignored.
///
pub fn attempt_max_open_file_limit() {
    use rlimit::Resource;

    let (soft, hard) = match Resource::NOFILE.get() {
        Ok(x) => x,
        Err(_) => return,
    };

    if soft < hard {
        rlimit::setrlimit(Resource::NOFILE, hard, hard).unwrap_or_default();
    }
}
