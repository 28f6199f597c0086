use std::process::ExitCode;
use clap::Parser;
use convsynth::cli::{run, Args};

fn main() -> ExitCode {
    run(Args::parse())
}
