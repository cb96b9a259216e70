use anyhow::Result;
use clap::Parser;
use sb3bsl_core::cli::Args;

fn main() -> Result<()> {
    let args = Args::parse();
    sb3bsl_core::run_cli(&args)
}
