use crate::logw;
use std::path::Path;
use std::process::Command;

#[cfg(target_os = "windows")]
const FILE_BROWSER: &str = "explorer";
#[cfg(target_os = "macos")]
const FILE_BROWSER: &str = "open";
#[cfg(all(unix, not(target_os = "macos")))]
const FILE_BROWSER: &str = "xdg-open";

/// Opens a workspace folder in the system file browser, creating it first if
/// the batch has not run yet.
pub fn open_folder<P: AsRef<Path>>(path: P) {
    let path = path.as_ref();
    if path.as_os_str().is_empty() {
        return;
    }
    if !path.exists() {
        if let Err(err) = std::fs::create_dir_all(path) {
            logw(format!("Cannot create {}: {}", path.display(), err));
            return;
        }
    }
    if let Err(err) = Command::new(FILE_BROWSER).arg(path).spawn() {
        logw(format!("{} {} failed: {}", FILE_BROWSER, path.display(), err));
    }
}
