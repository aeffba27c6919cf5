//! Component 4 – output files.
pub mod bin;
pub mod json;

use std::ffi::OsString;
use std::path::{Path, PathBuf};

/// `out` with `suffix` appended to its file name, e.g. `intro.cut` →
/// `intro.cut.json`.
pub fn with_suffix(out: &Path, suffix: &str) -> PathBuf {
    let mut name = OsString::from(out.as_os_str());
    name.push(suffix);
    PathBuf::from(name)
}
