//! CLI argument definitions

use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(
    name = "kload",
    about = "Load, probe and remove Linux kernel modules",
    after_help = "\
EXAMPLES:
    sudo kload probe ext4                    Load ext4 and its dependencies
    sudo kload probe nbd nbds_max=4          Parameters go to nbd only
    kload probe --dry-run ext4               Print the load order, load nothing
    sudo kload insert ./mymod.ko debug=1     Load one file, no dependency handling
    sudo kload remove mymod                  Unload a module
    kload list                               lsmod-style table"
)]
pub struct Args {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Load a module and everything it transitively depends on
    Probe {
        /// Module name as known to the kernel (hyphens and underscores
        /// are interchangeable)
        name: String,

        /// Module parameters, passed to the named module only
        #[arg(value_name = "PARAM")]
        params: Vec<String>,

        /// Filesystem root holding the module tree
        #[arg(long, default_value = "/", value_name = "DIR")]
        root: PathBuf,

        /// Kernel release to resolve against (default: uname -r)
        #[arg(long, value_name = "RELEASE")]
        kver: Option<String>,

        /// Resolve and print the load order without loading anything
        #[arg(long)]
        dry_run: bool,

        /// Load the whole closure even if /proc/modules lists parts of it
        #[arg(long)]
        ignore_loaded: bool,

        /// Ignore the kernel version magic on every load
        #[arg(long)]
        ignore_vermagic: bool,

        /// Ignore symbol version hashes on every load
        #[arg(long)]
        ignore_modversions: bool,
    },

    /// Load a single module file, with no dependency handling
    Insert {
        /// Path to a .ko, .ko.xz, .ko.gz or .ko.zst file
        path: PathBuf,

        /// Module parameters
        #[arg(value_name = "PARAM")]
        params: Vec<String>,

        /// Ignore the kernel version magic
        #[arg(long)]
        ignore_vermagic: bool,

        /// Ignore symbol version hashes
        #[arg(long)]
        ignore_modversions: bool,
    },

    /// Unload a module
    Remove {
        /// Loaded module name
        name: String,
    },

    /// List loaded modules
    List {
        /// Print /proc/modules verbatim instead of the formatted table
        #[arg(long)]
        raw: bool,
    },
}
