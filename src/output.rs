//! Writes decompiled targets, their assets and the project manifest.

use crate::compile::CompiledTarget;
use crate::emit::Diagnostic;
use crate::project::{Asset, Project};
use crate::sanitize::{sanitize, uniquify_with};
use anyhow::{Context, Result};
use indexmap::IndexMap;
use serde_json::{json, Map, Value};
use std::collections::HashSet;
use std::fs;
use std::path::Path;
use tracing::{debug, warn};

pub const SOURCE_EXTENSION: &str = "bsl";
pub const MANIFEST_FILE: &str = "manifest.json";

#[derive(Debug, Clone, Copy)]
pub struct OutputOptions {
    pub copy_assets: bool,
    pub verify_assets: bool,
    pub write_manifest: bool,
}

impl Default for OutputOptions {
    fn default() -> Self {
        Self {
            copy_assets: true,
            verify_assets: false,
            write_manifest: true,
        }
    }
}

#[derive(Debug, Clone)]
pub struct WrittenProject {
    pub manifest: Value,
    /// Missing or mismatched asset payloads.
    pub diagnostics: Vec<Diagnostic>,
}

/// Writes one `<dir>/<dir>.bsl` per target under `out_dir`. `asset_root` is
/// where the project's asset payloads live.
pub fn write_outputs(
    out_dir: &Path,
    asset_root: &Path,
    project: &Project,
    compiled: &[CompiledTarget],
    options: OutputOptions,
) -> Result<WrittenProject> {
    fs::create_dir_all(out_dir)
        .with_context(|| format!("Failed to create '{}'.", out_dir.display()))?;

    let mut used_dirs = HashSet::new();
    let mut targets_json = Vec::with_capacity(compiled.len());
    let mut diagnostics = Vec::new();
    for (target, result) in project.targets.iter().zip(compiled) {
        let dir_name = unique_dir_name(&result.name, &mut used_dirs);
        let target_dir = out_dir.join(&dir_name);
        fs::create_dir_all(&target_dir)?;

        let source_rel = format!("{}/{}.{}", dir_name, dir_name, SOURCE_EXTENSION);
        let source_path = out_dir.join(&source_rel);
        let mut text = result.source.clone();
        text.push('\n');
        fs::write(&source_path, text.as_bytes())
            .with_context(|| format!("Failed to write '{}'.", source_path.display()))?;
        debug!(target = %result.name, path = %source_path.display(), "wrote source");

        let placement = AssetPlacement {
            out_dir,
            asset_root,
            dir_name: &dir_name,
            options,
        };
        let costumes = placement.place("costumes", &target.costumes, &mut diagnostics)?;
        let sounds = placement.place("sounds", &target.sounds, &mut diagnostics)?;

        targets_json.push(json!({
            "name": result.name,
            "stage": result.is_stage,
            "source": source_rel,
            "costumes": costumes,
            "sounds": sounds,
        }));
    }

    let manifest = json!({ "targets": targets_json });
    if options.write_manifest {
        let path = out_dir.join(MANIFEST_FILE);
        fs::write(&path, serde_json::to_string_pretty(&manifest)?.as_bytes())
            .with_context(|| format!("Failed to write '{}'.", path.display()))?;
    }
    Ok(WrittenProject {
        manifest,
        diagnostics,
    })
}

struct AssetPlacement<'p> {
    out_dir: &'p Path,
    asset_root: &'p Path,
    dir_name: &'p str,
    options: OutputOptions,
}

impl AssetPlacement<'_> {
    /// Copies `assets` into `<dir>/<kind>/` and returns their manifest table.
    fn place(&self, kind: &str, assets: &[Asset], diagnostics: &mut Vec<Diagnostic>) -> Result<Value> {
        let mut entries: IndexMap<String, Value> = IndexMap::new();
        let mut used_files = HashSet::new();
        for asset in assets {
            let key = uniquify_with(asset.name.clone(), |k| entries.contains_key(k));
            if !self.options.copy_assets {
                entries.insert(
                    key,
                    json!({ "format": asset.data_format, "path": asset.file_name() }),
                );
                continue;
            }

            let source = self.asset_root.join(asset.file_name());
            if !source.is_file() {
                warn!(asset = %asset.name, path = %source.display(), "asset payload missing");
                diagnostics.push(Diagnostic {
                    block_id: None,
                    message: format!("asset '{}' missing ({})", asset.name, asset.file_name()),
                });
                continue;
            }
            let data = fs::read(&source)
                .with_context(|| format!("Failed to read '{}'.", source.display()))?;
            if self.options.verify_assets {
                let digest = format!("{:x}", md5::compute(&data));
                if digest != asset.asset_id {
                    warn!(asset = %asset.name, expected = %asset.asset_id, actual = %digest, "asset checksum mismatch");
                    diagnostics.push(Diagnostic {
                        block_id: None,
                        message: format!(
                            "asset '{}' checksum {} does not match asset id {}",
                            asset.name, digest, asset.asset_id
                        ),
                    });
                }
            }

            let stem = uniquify_with(sanitize(&asset.name), |s| {
                used_files.contains(&s.to_lowercase())
            });
            used_files.insert(stem.to_lowercase());
            let rel = format!("{}/{}/{}.{}", self.dir_name, kind, stem, asset.data_format);
            let dest = self.out_dir.join(&rel);
            if let Some(parent) = dest.parent() {
                fs::create_dir_all(parent)?;
            }
            fs::write(&dest, &data).with_context(|| format!("Failed to write '{}'.", dest.display()))?;
            entries.insert(key, json!({ "format": asset.data_format, "path": rel }));
        }
        Ok(Value::Object(entries.into_iter().collect::<Map<String, Value>>()))
    }
}

fn unique_dir_name(name: &str, used: &mut HashSet<String>) -> String {
    let dir = uniquify_with(sanitize(name), |candidate| {
        used.contains(&candidate.to_lowercase())
    });
    used.insert(dir.to_lowercase());
    dir
}
