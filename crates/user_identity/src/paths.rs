use std::ffi::OsStr;
use std::path::{Path, PathBuf};

/// Overrides the identity directory when set.
pub const IDENTITY_HOME_ENV_VAR: &str = "NOTEBOOK_HOME";

pub const IDENTITY_DIR: &str = ".smart_notebook";

pub const IDENTITY_FILE_NAME: &str = "identity.json";

/// Resolves the identity directory from `NOTEBOOK_HOME`, then `$HOME`.
#[must_use]
pub fn identity_root() -> Option<PathBuf> {
    identity_root_from(
        std::env::var_os(IDENTITY_HOME_ENV_VAR).as_deref(),
        std::env::var_os("HOME").as_deref(),
    )
}

#[must_use]
pub fn identity_root_from(override_dir: Option<&OsStr>, home: Option<&OsStr>) -> Option<PathBuf> {
    if let Some(dir) = override_dir.filter(|dir| !dir.is_empty()) {
        return Some(PathBuf::from(dir));
    }

    home.filter(|home| !home.is_empty())
        .map(|home| Path::new(home).join(IDENTITY_DIR))
}

#[must_use]
pub fn identity_file(root: &Path) -> PathBuf {
    root.join(IDENTITY_FILE_NAME)
}
