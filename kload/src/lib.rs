//! # kload - Linux kernel module loading with dependency resolution
//!
//! kload loads kernel modules on demand, including everything they
//! transitively depend on, while skipping modules the running kernel
//! already has. One contract covers the two incompatible load entry points
//! (whole-image `init_module(2)` and file-descriptor `finit_module(2)`,
//! with defined fallback rules between them) and the four on-disk module
//! encodings (raw `.ko` plus xz, gzip and zstd containers).
//!
//! ## Pipeline
//!
//! ```text
//! probe(name)
//!    │
//!    ▼
//! depmod::ModIndex          modules.dep + modules.builtin, name → path
//!    │
//!    ▼
//! probe engine              closure discovery, cycle detection, ordering
//!    │
//!    ▼
//! mod_table                 /proc/modules snapshot marks loaded nodes
//!    │
//!    ▼
//! decompress                suffix → raw passthrough or decoded stream
//!    │
//!    ▼
//! Loader                    finit_module(2) / init_module(2) / stub
//! ```
//!
//! ## Module Structure
//!
//! - [`probe`]: the orchestrator — resolves the dependency closure with an
//!   explicit-stack DFS, annotates it against live kernel state, loads the
//!   remainder dependency-first
//! - [`depmod`]: module tree discovery and the `modules.dep` /
//!   `modules.builtin` index
//! - [`mod_table`]: loaded-module table annotation and lsmod-style listing
//! - [`decompress`]: format dispatch over the module image encodings
//! - [`loader`]: the [`Loader`] trait and load flags; [`linux`] implements
//!   it over the real syscalls, [`unsupported`] is the uniformly-failing
//!   stub for other platforms
//! - [`errors`]: the typed failure taxonomy
//! - [`cli`]: command-line definitions for the `kload` binary
//!
//! ## Usage
//!
//! ```no_run
//! # fn main() -> Result<(), kload::LoadError> {
//! use kload::{Loader, PlatformLoader};
//!
//! let loader = PlatformLoader::new();
//! loader.probe("ext4", "")?;
//! # Ok(())
//! # }
//! ```
//!
//! Probing is deliberately not transactional: on the first failing module
//! the call aborts and already-loaded dependencies stay loaded, since
//! unloading a module another loaded module may reference is unsafe
//! without a live reference count.

pub mod cli;
pub mod decompress;
pub mod depmod;
pub mod errors;
#[cfg(target_os = "linux")]
pub mod linux;
pub mod loader;
pub mod mod_table;
pub mod probe;
pub mod unsupported;

pub use errors::{LoadError, Result};
#[cfg(target_os = "linux")]
pub use linux::LinuxLoader;
pub use loader::{
    Loader, PlatformLoader, MODULE_INIT_IGNORE_MODVERSIONS, MODULE_INIT_IGNORE_VERMAGIC,
};
#[cfg(target_os = "linux")]
pub use probe::{probe, probe_with_opts};
pub use probe::{DepMap, DepNode, ModState, ProbeOpts};
pub use unsupported::UnsupportedLoader;
