//! Dependency resolution and load orchestration
//!
//! The probe engine materializes a module's full dependency closure,
//! annotates it against the kernel's loaded-module table, and loads the
//! remainder dependency-first. Resolution completes before the first load
//! is attempted, so cycles and missing dependencies surface with no
//! syscall issued.

use std::collections::{HashMap, HashSet};
use std::fs::File;
use std::path::{Path, PathBuf};

use log::{debug, info};

use crate::depmod::ModIndex;
use crate::errors::{LoadError, Result};
use crate::loader::{Loader, MODULE_INIT_IGNORE_MODVERSIONS, MODULE_INIT_IGNORE_VERMAGIC};
use crate::mod_table;

/// Resolution state of one module within a single probe call.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ModState {
    /// Known but not currently being walked.
    Unresolved,
    /// On the active resolution stack; reaching it again means a cycle.
    Resolving,
    /// Active in the kernel, built in, or loaded during this call. Terminal.
    Loaded,
}

/// One module in the dependency closure.
#[derive(Debug)]
pub struct DepNode {
    /// Direct dependencies, in `modules.dep` order.
    pub deps: Vec<PathBuf>,
    pub state: ModState,
}

/// The dependency closure of one probe call, keyed by canonical on-disk
/// path. Owns its nodes; nothing survives the call.
#[derive(Debug, Default)]
pub struct DepMap {
    nodes: HashMap<PathBuf, DepNode>,
}

impl DepMap {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a node in `Unresolved` state. A path is inserted at most once
    /// per probe call.
    pub fn insert(&mut self, path: PathBuf, deps: Vec<PathBuf>) {
        self.nodes.insert(path, DepNode { deps, state: ModState::Unresolved });
    }

    pub fn get(&self, path: &Path) -> Option<&DepNode> {
        self.nodes.get(path)
    }

    pub fn set_state(&mut self, path: &Path, state: ModState) {
        if let Some(node) = self.nodes.get_mut(path) {
            node.state = state;
        }
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = (&PathBuf, &mut DepNode)> {
        self.nodes.iter_mut()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}

/// Optional knobs for [`Loader::probe_with_opts`]. The default gives the
/// standard behavior: the running kernel's module tree under `/`, live
/// table honored, no flags, real loads.
pub struct ProbeOpts {
    /// Filesystem root the module tree lives under.
    pub root_dir: PathBuf,
    /// Kernel release to resolve against; `None` asks uname(2).
    pub kernel_release: Option<String>,
    /// Skip the loaded-module annotation pass and load the whole closure.
    pub ignore_loaded: bool,
    /// Apply `MODULE_INIT_IGNORE_VERMAGIC` to every load in the closure.
    pub ignore_vermagic: bool,
    /// Apply `MODULE_INIT_IGNORE_MODVERSIONS` to every load in the closure.
    pub ignore_modversions: bool,
    /// Report each would-be load instead of performing it.
    pub dry_run: Option<Box<dyn FnMut(&Path)>>,
}

impl Default for ProbeOpts {
    fn default() -> Self {
        Self {
            root_dir: PathBuf::from("/"),
            kernel_release: None,
            ignore_loaded: false,
            ignore_vermagic: false,
            ignore_modversions: false,
            dry_run: None,
        }
    }
}

impl ProbeOpts {
    fn load_flags(&self) -> u32 {
        let mut flags = 0;
        if self.ignore_modversions {
            flags |= MODULE_INIT_IGNORE_MODVERSIONS;
        }
        if self.ignore_vermagic {
            flags |= MODULE_INIT_IGNORE_VERMAGIC;
        }
        flags
    }
}

/// The probe engine behind [`Loader::probe_with_opts`].
pub(crate) fn run<L: Loader + ?Sized>(
    loader: &L,
    name: &str,
    params: &str,
    mut opts: ProbeOpts,
) -> Result<()> {
    let index = ModIndex::discover(&opts.root_dir, opts.kernel_release.as_deref())?;

    let Some(target) = index.find_mod_path(name) else {
        return Err(LoadError::ModuleNotFound(name.to_string()));
    };
    let target = target.to_path_buf();

    if index.is_builtin(&target) {
        debug!("{name} is built into the kernel");
        return Ok(());
    }

    let mut map = DepMap::new();
    let order = resolve_closure(&index, &target, &mut map)?;
    debug!("{name}: dependency closure of {} modules", order.len());

    // The kernel owns the "already loaded" fact; snapshot it fresh for
    // every call rather than caching across calls.
    if !opts.ignore_loaded {
        let table = loader.loaded_modules()?;
        mod_table::annotate_loaded(&table, &mut map);
    }

    let flags = opts.load_flags();
    for path in &order {
        if map.get(path).is_some_and(|n| n.state == ModState::Loaded) {
            debug!("{} already loaded, skipping", path.display());
            continue;
        }
        let mod_params = if *path == target { params } else { "" };
        match opts.dry_run.as_mut() {
            Some(report) => report(path),
            None => load_module(loader, path, mod_params, flags).map_err(|e| {
                LoadError::Module { path: path.clone(), source: Box::new(e) }
            })?,
        }
        map.set_state(path, ModState::Loaded);
    }
    Ok(())
}

/// Depth-first closure discovery over an explicit work-stack, returning the
/// dependency-first load order.
///
/// Nodes are created on first reference and marked `Resolving` while their
/// frame is on the stack; meeting a `Resolving` node again is a cycle.
/// The explicit stack keeps arbitrarily deep graphs off the call stack.
fn resolve_closure(index: &ModIndex, target: &Path, map: &mut DepMap) -> Result<Vec<PathBuf>> {
    struct Frame {
        path: PathBuf,
        deps: Vec<PathBuf>,
        next: usize,
    }

    fn enter(index: &ModIndex, map: &mut DepMap, path: &Path) -> Result<Frame> {
        let deps = index
            .deps_of(path)
            .ok_or_else(|| LoadError::ModuleNotFound(path.display().to_string()))?
            .to_vec();
        map.insert(path.to_path_buf(), deps.clone());
        map.set_state(path, ModState::Resolving);
        Ok(Frame { path: path.to_path_buf(), deps, next: 0 })
    }

    let mut order: Vec<PathBuf> = Vec::new();
    let mut done: HashSet<PathBuf> = HashSet::new();
    let mut stack = vec![enter(index, map, target)?];

    while let Some(frame) = stack.last_mut() {
        if frame.next == frame.deps.len() {
            map.set_state(&frame.path, ModState::Unresolved);
            done.insert(frame.path.clone());
            order.push(frame.path.clone());
            stack.pop();
            continue;
        }
        let dep = frame.deps[frame.next].clone();
        frame.next += 1;

        if done.contains(&dep) {
            continue;
        }
        if map.get(&dep).is_some_and(|n| n.state == ModState::Resolving) {
            return Err(LoadError::DependencyCycle(dep));
        }
        if index.is_builtin(&dep) {
            map.insert(dep.clone(), Vec::new());
            map.set_state(&dep, ModState::Loaded);
            done.insert(dep);
            continue;
        }
        let next = enter(index, map, &dep)?;
        stack.push(next);
    }
    Ok(order)
}

fn load_module<L: Loader + ?Sized>(
    loader: &L,
    path: &Path,
    params: &str,
    flags: u32,
) -> Result<()> {
    info!("loading {}", path.display());
    let file = File::open(path)?;
    match loader.file_init(file, path, params, flags) {
        // Another caller won the race to load this module. The kernel's
        // registration is the sole mutual exclusion; treat it as success.
        Err(LoadError::LoadRejected(errno)) if errno == libc::EEXIST => Ok(()),
        other => other,
    }
}

/// Load `name` and its dependencies against the running kernel.
///
/// # Errors
/// See [`Loader::probe_with_opts`].
#[cfg(target_os = "linux")]
pub fn probe(name: &str, params: &str) -> Result<()> {
    crate::linux::LinuxLoader::new().probe(name, params)
}

/// [`probe`] with explicit [`ProbeOpts`].
///
/// # Errors
/// See [`Loader::probe_with_opts`].
#[cfg(target_os = "linux")]
pub fn probe_with_opts(name: &str, params: &str, opts: ProbeOpts) -> Result<()> {
    crate::linux::LinuxLoader::new().probe_with_opts(name, params, opts)
}
