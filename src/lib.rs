pub mod compile;
pub mod emit;
pub mod extensions;
pub mod procedures;
pub mod project;
pub mod sanitize;
pub mod scope;
pub mod signatures;

#[cfg(not(target_arch = "wasm32"))]
pub mod archive;

#[cfg(not(target_arch = "wasm32"))]
pub mod cli;

#[cfg(not(target_arch = "wasm32"))]
pub mod output;

#[cfg(all(target_arch = "wasm32", feature = "wasm-bindings"))]
pub mod wasm;

use anyhow::Result;
use compile::{decompile_project, CompiledTarget};
use extensions::{build_signature_table, BundledOnly};
use std::path::PathBuf;

#[cfg(not(target_arch = "wasm32"))]
use archive::ProjectSource;
#[cfg(not(target_arch = "wasm32"))]
use emit::Diagnostic;
#[cfg(not(target_arch = "wasm32"))]
use extensions::DescriptorDirLoader;
#[cfg(not(target_arch = "wasm32"))]
use output::{write_outputs, OutputOptions};
#[cfg(not(target_arch = "wasm32"))]
use serde_json::Value;
#[cfg(not(target_arch = "wasm32"))]
use std::path::Path;
#[cfg(not(target_arch = "wasm32"))]
use tracing::info;

/// Library-level mirror of the command line flags.
#[derive(Debug, Clone)]
pub struct DecompileOptions {
    pub extension_dirs: Vec<PathBuf>,
    pub copy_assets: bool,
    pub verify_assets: bool,
    pub write_manifest: bool,
}

impl Default for DecompileOptions {
    fn default() -> Self {
        Self {
            extension_dirs: Vec::new(),
            copy_assets: true,
            verify_assets: false,
            write_manifest: true,
        }
    }
}

#[cfg(not(target_arch = "wasm32"))]
impl DecompileOptions {
    pub fn from_args(args: &cli::Args) -> Self {
        Self {
            extension_dirs: args.extension_dirs.clone(),
            copy_assets: !args.no_assets,
            verify_assets: args.verify_assets,
            write_manifest: !args.no_manifest,
        }
    }

    fn output_options(&self) -> OutputOptions {
        OutputOptions {
            copy_assets: self.copy_assets,
            verify_assets: self.verify_assets,
            write_manifest: self.write_manifest,
        }
    }
}

/// Result of a full run: the compiled targets and the manifest that was
/// (or would have been) written.
#[cfg(not(target_arch = "wasm32"))]
#[derive(Debug, Clone)]
pub struct DecompileReport {
    pub targets: Vec<CompiledTarget>,
    pub manifest: Value,
    pub asset_diagnostics: Vec<Diagnostic>,
}

#[cfg(not(target_arch = "wasm32"))]
impl DecompileReport {
    pub fn diagnostic_count(&self) -> usize {
        self.targets.iter().map(|t| t.diagnostics.len()).sum::<usize>() + self.asset_diagnostics.len()
    }
}

/// Decompiles a bare `project.json` text using only the built-in and bundled
/// extension signatures.
pub fn decompile_json(text: &str) -> Result<Vec<CompiledTarget>> {
    let project = project::parse_project(text)?;
    let (table, _) = build_signature_table(&project, &BundledOnly)?;
    decompile_project(&project, &table)
}

#[cfg(not(target_arch = "wasm32"))]
pub fn decompile_to_dir(input: &Path, out_dir: &Path, options: &DecompileOptions) -> Result<DecompileReport> {
    decompile_with_progress(input, Some(out_dir), options, None)
}

/// Runs the whole pipeline. With `out_dir` of `None` nothing is written and
/// only the compiled sources are returned.
#[cfg(not(target_arch = "wasm32"))]
pub fn decompile_with_progress(
    input: &Path,
    out_dir: Option<&Path>,
    options: &DecompileOptions,
    mut on_stage: Option<&mut dyn FnMut(usize, usize, &str)>,
) -> Result<DecompileReport> {
    let total = if out_dir.is_some() { 5 } else { 4 };
    let mut stage = |step: usize, label: &str| {
        if let Some(cb) = on_stage.as_deref_mut() {
            cb(step, total, label);
        }
    };

    stage(1, "Opening project");
    let source = ProjectSource::open(input)?;

    stage(2, "Parsing project.json");
    let project = source.read_project()?;

    stage(3, "Loading extension signatures");
    let loader = DescriptorDirLoader::new(options.extension_dirs.clone());
    let (table, extension_diagnostics) = build_signature_table(&project, &loader)?;

    stage(4, "Decompiling targets");
    let mut targets = decompile_project(&project, &table)?;
    if let Some(first) = targets.first_mut() {
        let mut merged = extension_diagnostics;
        merged.append(&mut first.diagnostics);
        first.diagnostics = merged;
    }

    let Some(out_dir) = out_dir else {
        return Ok(DecompileReport {
            targets,
            manifest: Value::Null,
            asset_diagnostics: Vec::new(),
        });
    };
    stage(5, "Writing sources and assets");
    let written = write_outputs(out_dir, source.dir(), &project, &targets, options.output_options())?;
    Ok(DecompileReport {
        targets,
        manifest: written.manifest,
        asset_diagnostics: written.diagnostics,
    })
}

#[cfg(not(target_arch = "wasm32"))]
pub fn run_cli(args: &cli::Args) -> Result<()> {
    init_logging(args.verbose);
    let options = DecompileOptions::from_args(args);

    let progress = CliProgress::new("Decompile", 6);
    progress.emit(1, "Resolving input path");
    let input = canonicalize_input(&args.input)?;
    let out_dir = match &args.output {
        Some(path) => path.clone(),
        None => default_output_dir(&input),
    };

    let mut stage_cb = |step: usize, total: usize, label: &str| {
        progress.emit_with_total(1 + step, 1 + total, label);
    };
    let target_dir = (!args.stdout).then_some(out_dir.as_path());
    let report = decompile_with_progress(&input, target_dir, &options, Some(&mut stage_cb))?;

    if args.stdout {
        for target in &report.targets {
            println!("/* {} */", target.name);
            println!("{}", target.source);
            println!();
        }
    } else {
        info!(out = %out_dir.display(), "wrote decompiled project");
    }

    let diagnostics = report.diagnostic_count();
    if diagnostics > 0 {
        eprintln!(
            "Decompiled with {} diagnostic(s); see the warnings above.",
            diagnostics
        );
    }
    Ok(())
}

#[cfg(not(target_arch = "wasm32"))]
pub fn init_logging(verbose: bool) {
    use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Registry};

    let default_level = if verbose { "debug" } else { "warn" };
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    let layer = fmt::layer().with_writer(std::io::stderr).with_target(false);
    // Keeps an already installed subscriber.
    let _ = Registry::default().with(env_filter).with(layer).try_init();
}

#[cfg(not(target_arch = "wasm32"))]
pub fn canonicalize_input(path: &Path) -> Result<PathBuf> {
    if !path.exists() {
        return Err(anyhow::anyhow!("Input not found: '{}'.", path.display()));
    }
    Ok(path.canonicalize()?)
}

/// `<stem>_bsl` next to the input.
#[cfg(not(target_arch = "wasm32"))]
pub fn default_output_dir(input: &Path) -> PathBuf {
    let stem = input
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "project".to_string());
    input.with_file_name(format!("{}_bsl", stem))
}

#[cfg(not(target_arch = "wasm32"))]
struct CliProgress {
    prefix: &'static str,
    total: usize,
}

#[cfg(not(target_arch = "wasm32"))]
impl CliProgress {
    fn new(prefix: &'static str, total: usize) -> Self {
        Self {
            prefix,
            total: total.max(1),
        }
    }

    fn emit(&self, step: usize, label: &str) {
        self.emit_with_total(step, self.total, label);
    }

    fn emit_with_total(&self, step: usize, total: usize, label: &str) {
        let total = total.max(1);
        let step = step.clamp(1, total);
        eprintln!(
            "[{}] {}... ({}/{}) {}",
            self.prefix,
            label,
            step,
            total,
            render_progress_bar(step, total, 14)
        );
    }
}

#[cfg(not(target_arch = "wasm32"))]
fn render_progress_bar(step: usize, total: usize, width: usize) -> String {
    let width = width.max(1);
    let filled = ((step * width) + (total / 2)) / total;
    let mut bar = String::with_capacity(width + 2);
    bar.push('[');
    bar.extend((0..width).map(|i| if i < filled { '=' } else { '-' }));
    bar.push(']');
    bar
}
