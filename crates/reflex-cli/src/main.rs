// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 MuVeraAI Corporation

//! `reflexc` — compile a JSON rule document into a binary automaton blob.
//!
//! Reads the document from stdin (or a file) and writes the blob to the
//! path given with `--output`. On failure nothing is written and a
//! diagnostic goes to stderr with a non-zero exit status.

use std::fs;
use std::io::{self, Read};
use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;

use reflex_core::compile::compile_json;

#[derive(Parser)]
#[command(name = "reflexc", version, about = "Rule document compiler")]
struct Args {
    /// Input rule document; reads stdin when omitted.
    input: Option<PathBuf>,

    /// Path the compiled blob is written to.
    #[arg(short, long)]
    output: PathBuf,
}

fn run(args: &Args) -> Result<(), String> {
    let document = match &args.input {
        Some(path) => fs::read_to_string(path)
            .map_err(|err| format!("cannot read {}: {err}", path.display()))?,
        None => {
            let mut buf = String::new();
            io::stdin()
                .read_to_string(&mut buf)
                .map_err(|err| format!("cannot read stdin: {err}"))?;
            buf
        }
    };

    let blob = compile_json(&document).map_err(|err| err.to_string())?;

    fs::write(&args.output, blob)
        .map_err(|err| format!("cannot write {}: {err}", args.output.display()))
}

fn main() -> ExitCode {
    let args = Args::parse();
    match run(&args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(message) => {
            eprintln!("reflexc: {message}");
            ExitCode::FAILURE
        }
    }
}
