use std::{fs, io, path::Path, path::PathBuf};

use dirs::config_dir;

const APP_DIR: &str = "boringhannover";

/// `<config dir>/boringhannover/config.json`, falling back to the working directory.
pub fn default_config_path() -> PathBuf {
    let base = config_dir()
        .unwrap_or_else(|| std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")));
    base.join(APP_DIR).join("config.json")
}

pub fn ensure_parent(path: &Path) -> io::Result<()> {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => fs::create_dir_all(parent),
        _ => Ok(()),
    }
}
