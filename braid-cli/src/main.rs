use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use braid_core::{render, run_program};
use clap::Parser;

/// braid is a small homoiconic language with multi-pattern function
/// dispatch. This runner evaluates a program file and waits for its
/// concurrent tasks to finish.
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    /// Render the program's final value to stdout after it finishes.
    #[arg(short, long)]
    print: bool,

    /// The program file to run.
    file: String,

    /// Arguments exposed to the program as __args__.
    rest: Vec<String>,
}

fn main() -> Result<()> {
    let args = Args::parse();

    let source = fs::read_to_string(&args.file)
        .with_context(|| format!("failed to read program file '{}'", args.file))?;

    let path = Path::new(&args.file);
    let dirname = path
        .parent()
        .map(|p| p.to_string_lossy().into_owned())
        .unwrap_or_default();

    let result = run_program(&dirname, &args.file, &args.rest, &source);
    if args.print {
        println!("{}", render(&result));
    }
    Ok(())
}
