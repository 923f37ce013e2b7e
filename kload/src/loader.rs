//! The loader contract
//!
//! One operation set shared by the real kernel-backed loader and the
//! uniformly-failing stub for platforms without module support. Which one
//! [`PlatformLoader`] names is decided at compile time; callers only ever
//! see this trait.

use std::fs::File;
use std::path::Path;

use crate::errors::Result;
use crate::probe::{self, ProbeOpts};

/// finit_module(2): ignore symbol version hashes.
pub const MODULE_INIT_IGNORE_MODVERSIONS: u32 = 0x1;

/// finit_module(2): ignore the kernel version magic.
pub const MODULE_INIT_IGNORE_VERMAGIC: u32 = 0x2;

pub trait Loader {
    /// Load a complete in-memory module image with the given option string.
    ///
    /// # Errors
    /// [`crate::LoadError::InvalidOptions`] if `opts` contains an embedded
    /// NUL byte (checked before any syscall), otherwise the kernel's
    /// verdict.
    fn init(&self, image: &[u8], opts: &str) -> Result<()>;

    /// Load the module in `file`, decompressing by the suffix of `path`
    /// when needed.
    ///
    /// Raw images go through the file-descriptor load; if the kernel lacks
    /// finit_module(2) and `flags == 0`, the image is read into memory and
    /// loaded whole instead. With nonzero `flags` that fallback would drop
    /// the flags, so it fails with
    /// [`crate::LoadError::FlagsUnsupportedWithoutFileLoad`]; compressed
    /// images with nonzero `flags` fail the same way.
    fn file_init(&self, file: File, path: &Path, opts: &str, flags: u32) -> Result<()>;

    /// Unload the named module.
    fn delete(&self, name: &str, flags: u32) -> Result<()>;

    /// A raw snapshot of the kernel's loaded-module table, unformatted.
    fn loaded_modules(&self) -> Result<String>;

    /// Load `name` and everything it transitively depends on, skipping
    /// modules the kernel already has.
    ///
    /// # Errors
    /// See [`Loader::probe_with_opts`].
    fn probe(&self, name: &str, params: &str) -> Result<()> {
        self.probe_with_opts(name, params, ProbeOpts::default())
    }

    /// [`Loader::probe`] with explicit [`ProbeOpts`].
    ///
    /// # Errors
    /// [`crate::LoadError::ModuleNotFound`] when `name` has no file in the
    /// module tree, [`crate::LoadError::DependencyCycle`] on a cyclic
    /// dependency closure, or the first failing module's error wrapped
    /// with its path.
    fn probe_with_opts(&self, name: &str, params: &str, opts: ProbeOpts) -> Result<()> {
        probe::run(self, name, params, opts)
    }
}

/// The loader for the build target: kernel-backed on Linux, the
/// `NotSupported` stub everywhere else.
#[cfg(target_os = "linux")]
pub type PlatformLoader = crate::linux::LinuxLoader;

#[cfg(not(target_os = "linux"))]
pub type PlatformLoader = crate::unsupported::UnsupportedLoader;
