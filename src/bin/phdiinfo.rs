//! `phdiinfo`: prints the structure of a PHDI disk image without mounting it
//! (C14, spec.md §6). A thin read-only wrapper over [`phdi_rs::PhdiHandle`].

use std::env;
use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{anyhow, bail, Context};
use log::LevelFilter;

use phdi_rs::PhdiHandle;

const USAGE: &str = "Usage: phdiinfo [-v] [-V|--version] [-h|--help] <descriptor.phdi>";

struct Args {
    path: PathBuf,
    verbosity: u8,
}

fn parse_args() -> anyhow::Result<Args> {
    let mut verbosity = 0u8;
    let mut path = None;

    for arg in env::args().skip(1) {
        match arg.as_str() {
            "-h" | "--help" => {
                println!("{USAGE}");
                std::process::exit(0);
            }
            "-V" | "--version" => {
                println!("phdiinfo {}", env!("CARGO_PKG_VERSION"));
                std::process::exit(0);
            }
            "-v" | "--verbose" => verbosity += 1,
            other if path.is_none() => path = Some(PathBuf::from(other)),
            other => bail!("unexpected argument '{other}'\n{USAGE}"),
        }
    }

    let path = path.ok_or_else(|| anyhow!("missing descriptor path\n{USAGE}"))?;
    Ok(Args { path, verbosity })
}

fn main() -> ExitCode {
    let args = match parse_args() {
        Ok(args) => args,
        Err(e) => {
            eprintln!("phdiinfo: {e}");
            return ExitCode::FAILURE;
        }
    };

    let level = match args.verbosity {
        0 => LevelFilter::Warn,
        1 => LevelFilter::Info,
        _ => LevelFilter::Debug,
    };
    env_logger::Builder::new().filter_level(level).init();

    match run(&args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("phdiinfo: {e:#}");
            ExitCode::FAILURE
        }
    }
}

fn run(args: &Args) -> anyhow::Result<()> {
    let handle = PhdiHandle::new();
    handle
        .open(&args.path)
        .with_context(|| format!("opening '{}'", args.path.display()))?;

    let name = handle.name()?;
    let media_size = handle.media_size()?;
    println!("Name: {name}");
    println!(
        "Media size: {media_size} bytes ({:.2} MiB)",
        media_size as f64 / (1024.0 * 1024.0)
    );

    let extents = handle.extents()?;
    println!("Extents: {}", extents.len());
    for (i, extent) in extents.iter().enumerate() {
        println!(
            "  [{i}] offset={} size={} bytes, chain depth={}",
            extent.start_offset,
            extent.size,
            extent.image_chain.len()
        );
        for (depth, image) in extent.image_chain.iter().enumerate() {
            let role = match (depth, extent.image_chain.len()) {
                (0, 1) => "sole image",
                (0, _) => "top",
                (d, n) if d + 1 == n => "root",
                _ => "snapshot",
            };
            println!(
                "      {depth}: {} [{role}] {} ({})",
                image.identifier, image.filename, image.kind
            );
        }
    }

    let snapshot_count = handle.snapshots_count()?;
    println!("Snapshots: {snapshot_count}");
    for i in 0..snapshot_count {
        let snapshot = handle.snapshot(i)?;
        let parent = snapshot
            .parent_identifier
            .map(|g| g.to_string())
            .unwrap_or_else(|| "-".to_string());
        println!(
            "  [{i}] {} parent={}",
            snapshot.identifier, parent
        );
    }

    Ok(())
}
