//! Stub loader for platforms without kernel module support
//!
//! Implements the identical contract surface, deterministically failing
//! every mutating operation with `NotSupported`. The loaded-modules view
//! passes through whatever table file the loader was pointed at, raw and
//! unformatted.

use std::fs::{self, File};
use std::path::{Path, PathBuf};

use crate::errors::{LoadError, Result};
use crate::loader::Loader;
use crate::probe::ProbeOpts;

/// Loader for targets whose kernel takes no modules.
pub struct UnsupportedLoader {
    modules: PathBuf,
}

impl UnsupportedLoader {
    #[must_use]
    pub fn new() -> Self {
        Self::with_table("/proc/modules")
    }

    /// Read the loaded-modules view from `path` instead of the default.
    pub fn with_table(path: impl Into<PathBuf>) -> Self {
        Self { modules: path.into() }
    }
}

impl Default for UnsupportedLoader {
    fn default() -> Self {
        Self::new()
    }
}

impl Loader for UnsupportedLoader {
    fn init(&self, _image: &[u8], _opts: &str) -> Result<()> {
        Err(LoadError::NotSupported)
    }

    fn file_init(&self, _file: File, _path: &Path, _opts: &str, _flags: u32) -> Result<()> {
        Err(LoadError::NotSupported)
    }

    fn delete(&self, _name: &str, _flags: u32) -> Result<()> {
        Err(LoadError::NotSupported)
    }

    fn loaded_modules(&self) -> Result<String> {
        Ok(fs::read_to_string(&self.modules)?)
    }

    fn probe_with_opts(&self, _name: &str, _params: &str, _opts: ProbeOpts) -> Result<()> {
        Err(LoadError::NotSupported)
    }
}
