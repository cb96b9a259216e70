use clap::Parser;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(
    name = "sb3bsl",
    about = "Decompile an .sb3 block project into BSL source files."
)]
pub struct Args {
    #[arg(value_name = "INPUT", help = "An .sb3 archive or an extracted project directory.")]
    pub input: PathBuf,

    #[arg(
        value_name = "OUTPUT",
        help = "Output directory. Defaults to '<input stem>_bsl' next to the input."
    )]
    pub output: Option<PathBuf>,

    #[arg(
        long = "extensions",
        value_name = "DIR",
        help = "Directory of extension descriptor files (<id>.json). Repeatable."
    )]
    pub extension_dirs: Vec<PathBuf>,

    #[arg(long, help = "Do not copy costume and sound files.")]
    pub no_assets: bool,

    #[arg(long, help = "Do not write manifest.json.")]
    pub no_manifest: bool,

    #[arg(long, help = "Check each asset's md5 against its asset id.")]
    pub verify_assets: bool,

    #[arg(long, help = "Print generated sources to stdout instead of writing files.")]
    pub stdout: bool,

    #[arg(short, long, help = "Enable debug logging.")]
    pub verbose: bool,
}
