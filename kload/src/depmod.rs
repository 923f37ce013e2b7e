//! Module tree discovery
//!
//! Locates the versioned module tree (`/lib/modules/<release>`) and indexes
//! its `modules.dep` and `modules.builtin` tables, providing the
//! name-to-path lookup the probe engine resolves against.

use std::collections::{HashMap, HashSet};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use crate::errors::{LoadError, Result};

/// Roots the module tree may live under, tried in order.
const MODULE_TREES: [&str; 2] = ["lib/modules", "usr/lib/modules"];

/// File suffixes a module image may carry.
const MODULE_SUFFIXES: [&str; 4] = [".ko", ".ko.gz", ".ko.xz", ".ko.zst"];

/// Index of one kernel release's module tree.
///
/// Maps every module file to its direct dependencies (from `modules.dep`)
/// and records which modules are built into the kernel (from
/// `modules.builtin`). All paths are canonicalized against the tree root.
#[derive(Debug)]
pub struct ModIndex {
    dir: PathBuf,
    deps: HashMap<PathBuf, Vec<PathBuf>>,
    builtin: HashSet<PathBuf>,
}

impl ModIndex {
    /// Locate and index the module tree for `release` under `root`.
    ///
    /// `release` defaults to the running kernel's `uname -r`.
    ///
    /// # Errors
    /// Returns an error if the release cannot be determined or the tree has
    /// no readable `modules.dep`.
    pub fn discover(root: &Path, release: Option<&str>) -> Result<Self> {
        let release = match release {
            Some(r) => r.trim().to_string(),
            None => kernel_release()?,
        };

        let mut dir = PathBuf::new();
        for tree in MODULE_TREES {
            dir = root.join(tree).join(&release);
            if dir.exists() {
                break;
            }
        }
        Self::load(&dir)
    }

    /// Index the module tree rooted at `dir`.
    ///
    /// # Errors
    /// Returns an error when `modules.dep` is missing or unreadable. A
    /// missing `modules.builtin` is fine; not every tree ships one.
    pub fn load(dir: &Path) -> Result<Self> {
        let dep_path = dir.join("modules.dep");
        let text = fs::read_to_string(&dep_path).map_err(|e| LoadError::Module {
            path: dep_path,
            source: Box::new(e.into()),
        })?;

        let mut deps = HashMap::new();
        for line in text.lines() {
            let Some((mod_path, mod_deps)) = line.split_once(':') else {
                continue;
            };
            let mod_path = mod_path.trim();
            if mod_path.is_empty() {
                continue;
            }
            let list = mod_deps.split_whitespace().map(|d| dir.join(d)).collect();
            deps.insert(dir.join(mod_path), list);
        }

        let mut builtin = HashSet::new();
        let builtin_path = dir.join("modules.builtin");
        match fs::read_to_string(&builtin_path) {
            Ok(text) => {
                for line in text.lines() {
                    let line = line.trim();
                    if !line.is_empty() {
                        builtin.insert(dir.join(line));
                    }
                }
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => {
                return Err(LoadError::Module { path: builtin_path, source: Box::new(e.into()) })
            }
        }

        Ok(Self { dir: dir.to_path_buf(), deps, builtin })
    }

    /// The tree this index was built from.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Resolve a module name to its on-disk path.
    ///
    /// Module names are inconsistent about hyphens vs. underscores relative
    /// to their file names, so both spellings are accepted.
    pub fn find_mod_path(&self, name: &str) -> Option<&Path> {
        let want = normalize(name);
        self.deps
            .keys()
            .chain(self.builtin.iter())
            .find(|p| module_name(p).is_some_and(|n| normalize(&n) == want))
            .map(PathBuf::as_path)
    }

    /// Direct dependencies of the module at `path`, if it is indexed.
    pub fn deps_of(&self, path: &Path) -> Option<&[PathBuf]> {
        self.deps.get(path).map(Vec::as_slice)
    }

    /// Whether the module at `path` is built into the kernel.
    pub fn is_builtin(&self, path: &Path) -> bool {
        self.builtin.contains(path)
    }
}

/// Short module name for a path: the basename minus `.ko` and any
/// compression suffix. `None` when the basename is not a module file.
pub fn module_name(path: &Path) -> Option<String> {
    let base = path.file_name()?.to_str()?;
    for suffix in MODULE_SUFFIXES {
        if let Some(stem) = base.strip_suffix(suffix) {
            return Some(stem.to_string());
        }
    }
    None
}

/// Kernel module names treat `-` and `_` interchangeably.
pub fn normalize(name: &str) -> String {
    name.replace('-', "_")
}

/// The running kernel's release string, per uname(2).
#[cfg(target_os = "linux")]
#[allow(unsafe_code)] // uname(2) fills a raw out-param struct
fn kernel_release() -> Result<String> {
    use std::ffi::CStr;

    let mut uts = unsafe { std::mem::zeroed::<libc::utsname>() };
    if unsafe { libc::uname(&mut uts) } != 0 {
        return Err(io::Error::last_os_error().into());
    }
    let release = unsafe { CStr::from_ptr(uts.release.as_ptr()) };
    Ok(release.to_string_lossy().trim().to_string())
}

#[cfg(not(target_os = "linux"))]
fn kernel_release() -> Result<String> {
    Err(LoadError::NotSupported)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fixture(dep: &str, builtin: Option<&str>) -> (tempfile::TempDir, PathBuf) {
        let root = tempfile::tempdir().unwrap();
        let dir = root.path().join("lib/modules/6.6.0-test");
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join("modules.dep"), dep).unwrap();
        if let Some(b) = builtin {
            fs::write(dir.join("modules.builtin"), b).unwrap();
        }
        (root, dir)
    }

    #[test]
    fn test_parse_modules_dep() {
        let (_root, dir) = fixture(
            "kernel/fs/ext4/ext4.ko: kernel/lib/crc16.ko kernel/fs/mbcache.ko\n\
             kernel/lib/crc16.ko:\n\
             kernel/fs/mbcache.ko:\n",
            None,
        );
        let index = ModIndex::load(&dir).unwrap();

        let ext4 = dir.join("kernel/fs/ext4/ext4.ko");
        let deps = index.deps_of(&ext4).unwrap();
        assert_eq!(deps, [dir.join("kernel/lib/crc16.ko"), dir.join("kernel/fs/mbcache.ko")]);
        assert_eq!(index.deps_of(&dir.join("kernel/lib/crc16.ko")).unwrap(), &[] as &[PathBuf]);
    }

    #[test]
    fn test_discover_with_explicit_release() {
        let (root, dir) = fixture("kernel/fs/mbcache.ko:\n", None);
        let index = ModIndex::discover(root.path(), Some("6.6.0-test")).unwrap();
        assert_eq!(index.dir(), dir);
    }

    #[test]
    fn test_missing_modules_dep_is_an_error() {
        let root = tempfile::tempdir().unwrap();
        let err = ModIndex::discover(root.path(), Some("6.6.0-test")).unwrap_err();
        assert!(err.to_string().contains("modules.dep"));
    }

    #[test]
    fn test_find_mod_path_accepts_both_spellings() {
        let (_root, dir) = fixture("kernel/sound/snd-pcm.ko.xz:\n", None);
        let index = ModIndex::load(&dir).unwrap();

        let expected = dir.join("kernel/sound/snd-pcm.ko.xz");
        assert_eq!(index.find_mod_path("snd-pcm").unwrap(), expected);
        assert_eq!(index.find_mod_path("snd_pcm").unwrap(), expected);
        assert!(index.find_mod_path("snd").is_none());
    }

    #[test]
    fn test_builtin_modules_are_indexed() {
        let (_root, dir) =
            fixture("kernel/fs/mbcache.ko:\n", Some("kernel/fs/ext4/ext4.ko\n"));
        let index = ModIndex::load(&dir).unwrap();

        let ext4 = index.find_mod_path("ext4").unwrap().to_path_buf();
        assert!(index.is_builtin(&ext4));
        assert!(!index.is_builtin(&dir.join("kernel/fs/mbcache.ko")));
    }

    #[test]
    fn test_module_name_strips_suffixes() {
        assert_eq!(module_name(Path::new("a/b/ext4.ko")).unwrap(), "ext4");
        assert_eq!(module_name(Path::new("a/b/ext4.ko.xz")).unwrap(), "ext4");
        assert_eq!(module_name(Path::new("a/b/ext4.ko.gz")).unwrap(), "ext4");
        assert_eq!(module_name(Path::new("a/b/ext4.ko.zst")).unwrap(), "ext4");
        assert!(module_name(Path::new("a/b/README")).is_none());
    }
}
