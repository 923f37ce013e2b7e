//! Kernel-backed loader
//!
//! Thin wrappers over init_module(2), finit_module(2) and delete_module(2),
//! plus the fallback policy between the two load entry points. The syscalls
//! themselves are the only privileged operations in the crate; everything
//! above this layer is plain file and string handling.

#![allow(unsafe_code)] // the module syscalls have no libc wrappers

use std::ffi::CString;
use std::fs::{self, File};
use std::io;
use std::os::fd::AsRawFd;
use std::path::{Path, PathBuf};

use log::debug;

use crate::decompress::{self, ModuleReader};
use crate::errors::{LoadError, Result};
use crate::loader::Loader;

const PROC_MODULES: &str = "/proc/modules";

/// Loader backed by the running kernel.
pub struct LinuxLoader {
    modules: PathBuf,
}

impl LinuxLoader {
    /// A loader reading its loaded-module table from `/proc/modules`.
    #[must_use]
    pub fn new() -> Self {
        Self::with_table(PROC_MODULES)
    }

    /// A loader reading a `/proc/modules`-format table from `path` instead.
    pub fn with_table(path: impl Into<PathBuf>) -> Self {
        Self { modules: path.into() }
    }
}

impl Default for LinuxLoader {
    fn default() -> Self {
        Self::new()
    }
}

impl Loader for LinuxLoader {
    fn init(&self, image: &[u8], opts: &str) -> Result<()> {
        let opts = options_cstring(opts)?;
        init_module(image, &opts)
    }

    fn file_init(&self, file: File, path: &Path, opts: &str, flags: u32) -> Result<()> {
        let copts = options_cstring(opts)?;

        match decompress::module_reader(file, path)? {
            ModuleReader::Raw(file) => match finit_module(&file, &copts, flags) {
                Ok(()) => Ok(()),
                Err(errno) if errno == libc::ENOSYS => {
                    if flags != 0 {
                        return Err(LoadError::FlagsUnsupportedWithoutFileLoad);
                    }
                    debug!(
                        "finit_module(2) unavailable, loading {} as an in-memory image",
                        path.display()
                    );
                    let image = ModuleReader::Raw(file).read_image()?;
                    init_module(&image, &copts)
                }
                Err(errno) => Err(load_error(errno)),
            },
            reader @ ModuleReader::Stream(_) => {
                // A decoded stream has no descriptor to hand to the kernel,
                // so it can only go through the whole-image path, which
                // cannot carry flags.
                if flags != 0 {
                    return Err(LoadError::FlagsUnsupportedWithoutFileLoad);
                }
                let image = reader.read_image()?;
                init_module(&image, &copts)
            }
        }
    }

    fn delete(&self, name: &str, flags: u32) -> Result<()> {
        let name = CString::new(name).map_err(|_| LoadError::InvalidOptions)?;
        let rc = unsafe {
            libc::syscall(libc::SYS_delete_module, name.as_ptr(), flags as libc::c_int)
        };
        if rc == 0 {
            Ok(())
        } else {
            Err(load_error(errno()))
        }
    }

    fn loaded_modules(&self) -> Result<String> {
        Ok(fs::read_to_string(&self.modules)?)
    }
}

/// NUL-terminate a kernel option string, rejecting embedded NULs before any
/// syscall is attempted.
fn options_cstring(opts: &str) -> Result<CString> {
    CString::new(opts).map_err(|_| LoadError::InvalidOptions)
}

fn init_module(image: &[u8], opts: &std::ffi::CStr) -> Result<()> {
    let rc = unsafe {
        libc::syscall(
            libc::SYS_init_module,
            image.as_ptr(),
            image.len() as libc::c_ulong,
            opts.as_ptr(),
        )
    };
    if rc == 0 {
        Ok(())
    } else {
        Err(load_error(errno()))
    }
}

/// Raw finit_module(2); the caller decides what each errno means.
fn finit_module(file: &File, opts: &std::ffi::CStr, flags: u32) -> std::result::Result<(), i32> {
    let rc = unsafe {
        libc::syscall(
            libc::SYS_finit_module,
            file.as_raw_fd(),
            opts.as_ptr(),
            flags as libc::c_int,
        )
    };
    if rc == 0 {
        Ok(())
    } else {
        Err(errno())
    }
}

fn errno() -> i32 {
    io::Error::last_os_error().raw_os_error().unwrap_or(libc::EIO)
}

fn load_error(errno: i32) -> LoadError {
    match errno {
        libc::EPERM => LoadError::PermissionDenied,
        e => LoadError::LoadRejected(e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_embedded_nul_rejected_before_syscall() {
        let loader = LinuxLoader::new();
        let err = loader.init(b"", "bad\0opt").unwrap_err();
        assert!(matches!(err, LoadError::InvalidOptions));
    }

    #[test]
    fn test_flags_on_compressed_module_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("mod.ko.gz");
        let mut enc = flate2::write::GzEncoder::new(Vec::new(), flate2::Compression::default());
        enc.write_all(b"image").unwrap();
        fs::write(&path, enc.finish().unwrap()).unwrap();

        let loader = LinuxLoader::new();
        let file = File::open(&path).unwrap();
        let err = loader
            .file_init(file, &path, "", crate::loader::MODULE_INIT_IGNORE_VERMAGIC)
            .unwrap_err();
        assert!(matches!(err, LoadError::FlagsUnsupportedWithoutFileLoad));
    }

    #[test]
    fn test_unknown_suffix_rejected_without_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("mod.ko.lz4");
        fs::write(&path, b"image").unwrap();

        let loader = LinuxLoader::new();
        let file = File::open(&path).unwrap();
        let err = loader.file_init(file, &path, "", 0).unwrap_err();
        assert!(matches!(err, LoadError::UnsupportedFormat(_)));
    }

    #[test]
    fn test_loaded_modules_reads_table_file() {
        let dir = tempfile::tempdir().unwrap();
        let table = dir.path().join("modules");
        fs::write(&table, "ext4 1081344 2 - Live 0x0000000000000000\n").unwrap();

        let loader = LinuxLoader::with_table(&table);
        assert!(loader.loaded_modules().unwrap().starts_with("ext4 "));
    }

    #[test]
    fn test_errno_maps_to_taxonomy() {
        assert!(matches!(load_error(libc::EPERM), LoadError::PermissionDenied));
        assert!(matches!(load_error(libc::EEXIST), LoadError::LoadRejected(e) if e == libc::EEXIST));
    }
}
