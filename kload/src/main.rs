//! # kload - Main Entry Point
//!
//! Thin process wiring over the library: parse arguments, pick the
//! platform loader, map typed failures to exit codes.

use anyhow::{Context, Result};
use clap::Parser;
use std::fs::File;
use std::path::Path;

use kload::cli::{Args, Command};
use kload::errors::LoadError;
use kload::loader::{
    Loader, PlatformLoader, MODULE_INIT_IGNORE_MODVERSIONS, MODULE_INIT_IGNORE_VERMAGIC,
};
use kload::mod_table;
use kload::probe::ProbeOpts;

// Exit codes
const EXIT_SUCCESS: i32 = 0;
const EXIT_ERROR: i32 = 1;
const EXIT_NOPERM: i32 = 77;

fn main() {
    env_logger::init();
    std::process::exit(match run() {
        Ok(()) => EXIT_SUCCESS,
        Err(e) => {
            eprintln!("error: {e:#}");
            exit_code_for(&e)
        }
    });
}

fn exit_code_for(err: &anyhow::Error) -> i32 {
    for cause in err.chain() {
        if let Some(LoadError::PermissionDenied) = cause.downcast_ref::<LoadError>() {
            return EXIT_NOPERM;
        }
    }
    EXIT_ERROR
}

fn run() -> Result<()> {
    let args = Args::parse();
    let loader = PlatformLoader::new();

    match args.command {
        Command::Probe {
            name,
            params,
            root,
            kver,
            dry_run,
            ignore_loaded,
            ignore_vermagic,
            ignore_modversions,
        } => {
            let mut opts = ProbeOpts {
                root_dir: root,
                kernel_release: kver,
                ignore_loaded,
                ignore_vermagic,
                ignore_modversions,
                ..ProbeOpts::default()
            };
            if dry_run {
                opts.dry_run = Some(Box::new(|path: &Path| println!("{}", path.display())));
            }
            loader
                .probe_with_opts(&name, &params.join(" "), opts)
                .with_context(|| format!("could not probe {name}"))
        }

        Command::Insert { path, params, ignore_vermagic, ignore_modversions } => {
            let mut flags = 0;
            if ignore_vermagic {
                flags |= MODULE_INIT_IGNORE_VERMAGIC;
            }
            if ignore_modversions {
                flags |= MODULE_INIT_IGNORE_MODVERSIONS;
            }
            let file = File::open(&path)
                .with_context(|| format!("could not open {}", path.display()))?;
            loader
                .file_init(file, &path, &params.join(" "), flags)
                .with_context(|| format!("could not load {}", path.display()))
        }

        Command::Remove { name } => {
            loader.delete(&name, 0).with_context(|| format!("could not unload {name}"))
        }

        Command::List { raw } => {
            let table =
                loader.loaded_modules().context("could not read the loaded-module table")?;
            if raw {
                print!("{table}");
            } else {
                print!("{}", mod_table::pretty(&table));
            }
            Ok(())
        }
    }
}
