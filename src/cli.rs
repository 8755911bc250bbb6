// Copyright 2025-present Harīṣh Tummalachērla
// SPDX-License-Identifier: Apache-2.0

//! CLI definitions for the terse command-line interface.
//!
//! Three subcommands: `construct` to build an index from a file, `query` to
//! run count/search/extract/get against a persisted index, and `inspect` to
//! print its storage breakdown. Construction writes a `config.json` manifest
//! next to the index so queries reopen it with the right schemes.

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(
    name = "terse",
    about = "Compressed full-text index: query without decompressing",
    version
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Build an index from an input file
    Construct {
        /// Input file to index
        input: String,

        /// Output directory (defaults to <input>.succinct)
        #[arg(short, long)]
        output: Option<String>,

        /// Treat input as newline-delimited key-value records
        #[arg(long)]
        kv: bool,

        /// Suffix-array sampling rate
        #[arg(long, default_value = "32")]
        sa_rate: u32,

        /// Inverse-suffix-array sampling rate
        #[arg(long, default_value = "32")]
        isa_rate: u32,

        /// NPA cell sampling rate
        #[arg(long, default_value = "128")]
        npa_rate: u32,

        /// Context length for NPA cell grouping
        #[arg(long, default_value = "3")]
        context_len: u32,

        /// NPA encoding: 0=Elias-delta, 1=Elias-gamma, 2=wavelet-tree
        #[arg(long, default_value = "1")]
        encoding: u32,

        /// Sampling scheme: 0=flat-by-index, 1=flat-by-value, 2=layered,
        /// 3=opportunistic-layered
        #[arg(long, default_value = "0")]
        sampling: u32,

        /// Layer range for layered schemes (base rate = rate * range)
        #[arg(long, default_value = "8")]
        sampling_range: u32,
    },

    /// Query a persisted index
    Query {
        /// Index directory (as produced by construct)
        index: String,

        /// Memory-map the index instead of loading it
        #[arg(long)]
        mmap: bool,

        #[command(subcommand)]
        op: QueryOp,
    },

    /// Print the storage breakdown of a persisted index
    Inspect {
        /// Index directory (as produced by construct)
        index: String,
    },
}

#[derive(Subcommand)]
pub enum QueryOp {
    /// Count occurrences of a pattern
    Count { pattern: String },

    /// List offsets of every occurrence of a pattern
    Search { pattern: String },

    /// Extract a substring by offset and length
    Extract { offset: u64, len: u64 },

    /// Fetch the value of a key (key-value indexes)
    Get { key: i64 },

    /// Fetch part of a key's value (key-value indexes)
    Access { key: i64, offset: u64, len: u64 },
}
