//! Structured error types for kload
//!
//! Using thiserror for automatic Display implementation and error chaining.

use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, LoadError>;

#[derive(Error, Debug)]
pub enum LoadError {
    /// No file for the requested module name anywhere in the module tree.
    #[error("could not find module {0:?}")]
    ModuleNotFound(String),

    /// The dependency relation reachable from the requested module is cyclic.
    /// Fatal for the whole probe call.
    #[error("dependency cycle involving {}", .0.display())]
    DependencyCycle(PathBuf),

    /// The module file carries a suffix none of the decoders recognize.
    #[error("unsupported module suffix {0:?}")]
    UnsupportedFormat(String),

    /// The compressed container was malformed or truncated.
    #[error("failed to decode module image: {0}")]
    DecodeFailed(io::Error),

    /// Loading kernel modules requires CAP_SYS_MODULE.
    #[error("permission denied (loading kernel modules requires CAP_SYS_MODULE)")]
    PermissionDenied,

    /// Module options and names are transmitted NUL-terminated and must not
    /// contain embedded NUL bytes.
    #[error("embedded NUL byte in module options or name")]
    InvalidOptions,

    /// The kernel has no finit_module(2), so load flags cannot be honored.
    #[error("kernel lacks finit_module(2); load flags cannot be honored")]
    FlagsUnsupportedWithoutFileLoad,

    /// The kernel rejected the operation; carries the raw errno for diagnosis.
    #[error("kernel rejected module (os error {0})")]
    LoadRejected(i32),

    /// This platform has no kernel module support.
    #[error("kernel modules are not supported on this platform")]
    NotSupported,

    /// Attaches the failing module path to an underlying error.
    #[error("{}: {source}", .path.display())]
    Module {
        path: PathBuf,
        #[source]
        source: Box<LoadError>,
    },

    #[error(transparent)]
    Io(#[from] io::Error),
}
