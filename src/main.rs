// Copyright 2025-present Harīṣh Tummalachērla
// SPDX-License-Identifier: Apache-2.0

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::process;

use clap::Parser;
use serde::{Deserialize, Serialize};

use terse::{index_dir, NpaScheme, SamplingScheme, SuccinctConfig, SuccinctFile, SuccinctShard};

mod cli;
use cli::{Cli, Commands, QueryOp};

/// Manifest written next to a persisted index so queries can reopen it with
/// the construction-time schemes.
#[derive(Serialize, Deserialize)]
struct IndexManifest {
    kv: bool,
    config: SuccinctConfig,
}

fn main() {
    let cli = Cli::parse();
    let result = match cli.command {
        Commands::Construct {
            input,
            output,
            kv,
            sa_rate,
            isa_rate,
            npa_rate,
            context_len,
            encoding,
            sampling,
            sampling_range,
        } => run_construct(
            &input,
            output.as_deref(),
            kv,
            sa_rate,
            isa_rate,
            npa_rate,
            context_len,
            encoding,
            sampling,
            sampling_range,
        ),
        Commands::Query { index, mmap, op } => run_query(&index, mmap, &op),
        Commands::Inspect { index } => run_inspect(&index),
    };

    if let Err(e) = result {
        eprintln!("error: {}", e);
        process::exit(1);
    }
}

fn scheme_from_flag(encoding: u32) -> io::Result<NpaScheme> {
    // CLI numbering differs from the on-disk scheme ids.
    match encoding {
        0 => Ok(NpaScheme::EliasDelta),
        1 => Ok(NpaScheme::EliasGamma),
        2 => Ok(NpaScheme::WaveletTree),
        other => Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("unknown encoding selector {} (expected 0-2)", other),
        )),
    }
}

fn sampling_from_flag(sampling: u32) -> io::Result<SamplingScheme> {
    SamplingScheme::from_u64(sampling as u64).ok_or_else(|| {
        io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("unknown sampling selector {} (expected 0-3)", sampling),
        )
    })
}

#[allow(clippy::too_many_arguments)]
fn run_construct(
    input: &str,
    output: Option<&str>,
    kv: bool,
    sa_rate: u32,
    isa_rate: u32,
    npa_rate: u32,
    context_len: u32,
    encoding: u32,
    sampling: u32,
    sampling_range: u32,
) -> io::Result<()> {
    let scheme = sampling_from_flag(sampling)?;
    let config = SuccinctConfig {
        sa_sampling_rate: sa_rate,
        isa_sampling_rate: isa_rate,
        npa_sampling_rate: npa_rate,
        context_len,
        npa_encoding: scheme_from_flag(encoding)?,
        sa_sampling_scheme: scheme,
        isa_sampling_scheme: scheme,
        sampling_range,
    };
    config.validate()?;

    let input_path = Path::new(input);
    let data = fs::read(input_path)?;
    let dir = output.map_or_else(|| index_dir(input_path), PathBuf::from);

    #[cfg(feature = "progress")]
    let spinner = {
        let s = indicatif::ProgressBar::new_spinner();
        s.set_message(format!("indexing {} bytes", data.len()));
        s.enable_steady_tick(std::time::Duration::from_millis(120));
        s
    };

    let written = if kv {
        let shard = SuccinctShard::construct(&data, &config)?;
        shard.serialize(&dir)?
    } else {
        let file = SuccinctFile::construct(&data, &config)?;
        file.serialize(&dir)?
    };

    #[cfg(feature = "progress")]
    spinner.finish_and_clear();

    let manifest = IndexManifest { kv, config };
    let manifest_json = serde_json::to_string_pretty(&manifest)
        .map_err(|e| io::Error::new(io::ErrorKind::Other, e))?;
    fs::write(dir.join("config.json"), manifest_json)?;

    println!(
        "indexed {} bytes -> {} ({} bytes)",
        data.len(),
        dir.display(),
        written
    );
    Ok(())
}

fn read_manifest(dir: &Path) -> io::Result<IndexManifest> {
    let raw = fs::read_to_string(dir.join("config.json"))?;
    serde_json::from_str(&raw).map_err(|e| {
        io::Error::new(
            io::ErrorKind::InvalidData,
            format!("bad index manifest: {}", e),
        )
    })
}

fn run_query(index: &str, mmap: bool, op: &QueryOp) -> io::Result<()> {
    let dir = Path::new(index);
    let manifest = read_manifest(dir)?;

    if manifest.kv {
        let shard = SuccinctShard::load(dir, &manifest.config)?;
        return run_shard_query(&shard, op);
    }

    let file = if mmap {
        SuccinctFile::map(dir, &manifest.config)?
    } else {
        SuccinctFile::load(dir, &manifest.config)?
    };
    run_file_query(&file, op)
}

fn run_file_query(file: &SuccinctFile, op: &QueryOp) -> io::Result<()> {
    match op {
        QueryOp::Count { pattern } => {
            println!("{}", file.count(pattern.as_bytes()));
        }
        QueryOp::Search { pattern } => {
            let mut offsets = file.search(pattern.as_bytes());
            offsets.sort_unstable();
            for off in offsets {
                println!("{}", off);
            }
        }
        QueryOp::Extract { offset, len } => {
            let bytes = file.extract(*offset, *len);
            println!("{}", String::from_utf8_lossy(&bytes));
        }
        QueryOp::Get { .. } | QueryOp::Access { .. } => {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "get/access require a key-value index (construct with --kv)",
            ));
        }
    }
    Ok(())
}

fn run_shard_query(shard: &SuccinctShard, op: &QueryOp) -> io::Result<()> {
    match op {
        QueryOp::Count { pattern } => {
            println!("{}", shard.count(pattern.as_bytes()));
        }
        QueryOp::Search { pattern } => {
            for key in shard.search(pattern.as_bytes()) {
                println!("{}", key);
            }
        }
        QueryOp::Extract { offset, len } => {
            let bytes = shard.flat_extract(*offset, *len);
            println!("{}", String::from_utf8_lossy(&bytes));
        }
        QueryOp::Get { key } => match shard.get(*key) {
            Some(value) => println!("{}", String::from_utf8_lossy(&value)),
            None => println!(),
        },
        QueryOp::Access { key, offset, len } => match shard.access(*key, *offset, *len) {
            Some(value) => println!("{}", String::from_utf8_lossy(&value)),
            None => println!(),
        },
    }
    Ok(())
}

fn run_inspect(index: &str) -> io::Result<()> {
    let dir = Path::new(index);
    let manifest = read_manifest(dir)?;

    let report = if manifest.kv {
        let shard = SuccinctShard::load(dir, &manifest.config)?;
        let core = shard.core();
        serde_json::json!({
            "kind": "shard",
            "input_size": core.input_size(),
            "num_keys": shard.num_keys(),
            "sigma": core.alphabet().sigma(),
            "npa_encoding": manifest.config.npa_encoding,
            "storage_bytes": {
                "total": shard.storage_bytes(),
                "sa": core.sa().storage_bytes(),
                "isa": core.isa().storage_bytes(),
                "npa": core.npa().storage_bytes(),
            },
        })
    } else {
        let file = SuccinctFile::load(dir, &manifest.config)?;
        let core = file.core();
        serde_json::json!({
            "kind": "file",
            "input_size": core.input_size(),
            "sigma": core.alphabet().sigma(),
            "npa_encoding": manifest.config.npa_encoding,
            "storage_bytes": {
                "total": file.storage_bytes(),
                "sa": core.sa().storage_bytes(),
                "isa": core.isa().storage_bytes(),
                "npa": core.npa().storage_bytes(),
            },
        })
    };

    println!(
        "{}",
        serde_json::to_string_pretty(&report).map_err(|e| io::Error::new(io::ErrorKind::Other, e))?
    );
    Ok(())
}
