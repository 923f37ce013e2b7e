//! The kernel's loaded-module table
//!
//! `/proc/modules` is line-oriented and append-only by convention: the
//! first whitespace-delimited field of each line is a loaded module's short
//! name, and later fields may grow. This module annotates a dependency map
//! against that text and renders it for humans.

use std::collections::HashSet;

use crate::depmod;
use crate::probe::{DepMap, ModState};

/// Mark every node of `map` whose module name appears in `table` as loaded.
///
/// Pure annotation: nothing is loaded or unloaded, only in-memory state
/// changes. A node matches when its basename, stripped of `.ko` and any
/// compression suffix, equals a table entry under `-`/`_` equivalence.
/// Malformed table lines are skipped; table names with no matching node
/// are ignored.
pub fn annotate_loaded(table: &str, map: &mut DepMap) {
    let live: HashSet<String> = table
        .lines()
        .filter_map(|line| line.split_whitespace().next())
        .map(depmod::normalize)
        .collect();

    for (path, node) in map.iter_mut() {
        if node.state == ModState::Loaded {
            continue;
        }
        let Some(name) = depmod::module_name(path) else {
            continue;
        };
        if live.contains(&depmod::normalize(&name)) {
            node.state = ModState::Loaded;
        }
    }
}

/// Render `/proc/modules` text the way lsmod does.
///
/// Lines with fewer than four fields are skipped, mirroring the scanner's
/// tolerance for malformed input.
#[must_use]
pub fn pretty(table: &str) -> String {
    let mut out = format!("{:<28}{:>8}  Used by\n", "Module", "Size");
    for line in table.lines() {
        let fields: Vec<&str> = line.split_whitespace().collect();
        if fields.len() < 4 {
            continue;
        }
        let mut row = format!("{:<28}{:>8}  {}", fields[0], fields[1], fields[2]);
        if fields[3] != "-" {
            row.push(' ');
            row.push_str(fields[3].trim_end_matches(','));
        }
        out.push_str(&row);
        out.push('\n');
    }
    out
}
