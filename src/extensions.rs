//! Extension signatures.
//!
//! The decompiler never runs extension code. A loader only has to produce the
//! block list an extension's `getInfo()` would report; the shipped loader
//! reads that list from JSON descriptor files.

use crate::emit::Diagnostic;
use crate::project::Project;
use crate::signatures::{ExtensionBlock, SignatureTable, BUNDLED_EXTENSIONS};
use anyhow::{anyhow, Context, Result};
use serde_json::Value;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtensionInfo {
    pub id: String,
    pub blocks: Vec<ExtensionBlock>,
}

pub trait ExtensionLoader {
    /// `Ok(None)` means the loader knows nothing about this extension.
    fn load(&self, extension_id: &str, locator: Option<&str>) -> Result<Option<ExtensionInfo>>;
}

/// Loader for builds without descriptor files: only bundled extensions are known.
#[derive(Debug, Clone, Copy, Default)]
pub struct BundledOnly;

impl ExtensionLoader for BundledOnly {
    fn load(&self, _extension_id: &str, _locator: Option<&str>) -> Result<Option<ExtensionInfo>> {
        Ok(None)
    }
}

/// Finds `<extension_id>.json` in a list of directories. A locator that names
/// an existing local `.json` file is used directly.
#[derive(Debug, Clone, Default)]
pub struct DescriptorDirLoader {
    dirs: Vec<PathBuf>,
}

impl DescriptorDirLoader {
    pub fn new(dirs: Vec<PathBuf>) -> Self {
        Self { dirs }
    }

    fn find(&self, extension_id: &str, locator: Option<&str>) -> Option<PathBuf> {
        if let Some(path) = locator.map(Path::new) {
            if path.extension().is_some_and(|ext| ext == "json") && path.is_file() {
                return Some(path.to_path_buf());
            }
        }
        self.dirs
            .iter()
            .map(|dir| dir.join(format!("{}.json", extension_id)))
            .find(|candidate| candidate.is_file())
    }
}

impl ExtensionLoader for DescriptorDirLoader {
    fn load(&self, extension_id: &str, locator: Option<&str>) -> Result<Option<ExtensionInfo>> {
        let Some(path) = self.find(extension_id, locator) else {
            return Ok(None);
        };
        debug!(extension = extension_id, path = %path.display(), "reading extension descriptor");
        let text = fs::read_to_string(&path)
            .with_context(|| format!("Failed to read '{}'.", path.display()))?;
        parse_descriptor(&text)
            .with_context(|| format!("Invalid extension descriptor '{}'.", path.display()))
            .map(Some)
    }
}

/// Parses a `getInfo()`-shaped object: `{"id", "blocks": [{"opcode",
/// "arguments", "blockType"}]}`. Separators and labels in the block list are
/// skipped.
pub fn parse_descriptor(text: &str) -> Result<ExtensionInfo> {
    let json: Value = serde_json::from_str(text)?;
    let id = json
        .get("id")
        .and_then(Value::as_str)
        .ok_or_else(|| anyhow!("descriptor missing 'id'."))?
        .to_string();
    let blocks = json
        .get("blocks")
        .and_then(Value::as_array)
        .ok_or_else(|| anyhow!("descriptor '{}' missing 'blocks' array.", id))?
        .iter()
        .filter_map(|block| {
            let opcode = block.get("opcode").and_then(Value::as_str)?;
            let argument_names = block
                .get("arguments")
                .and_then(Value::as_object)
                .map(|args| args.keys().cloned().collect())
                .unwrap_or_default();
            let block_type = block
                .get("blockType")
                .and_then(Value::as_str)
                .unwrap_or("command")
                .to_string();
            Some(ExtensionBlock {
                opcode: opcode.to_string(),
                argument_names,
                block_type,
            })
        })
        .collect();
    Ok(ExtensionInfo { id, blocks })
}

/// Built-in table extended with every extension the project uses. The result
/// is read-only for the rest of the run.
pub fn build_signature_table(
    project: &Project,
    loader: &dyn ExtensionLoader,
) -> Result<(SignatureTable, Vec<Diagnostic>)> {
    let mut table = SignatureTable::builtin();
    let mut diagnostics = Vec::new();

    let mut ids = project.extensions.clone();
    for id in project.extension_urls.keys() {
        if !ids.contains(id) {
            ids.push(id.clone());
        }
    }

    for id in ids {
        if BUNDLED_EXTENSIONS.contains(&id.as_str()) {
            continue;
        }
        let locator = project.extension_urls.get(&id).map(String::as_str);
        match loader.load(&id, locator)? {
            Some(info) => {
                if info.id != id {
                    warn!(project_id = %id, descriptor_id = %info.id, "extension id mismatch");
                }
                table.extend_with(&info.id, &info.blocks);
            }
            None => {
                let message = format!(
                    "no descriptor for extension '{}'{}; its blocks will be placeholders",
                    id,
                    locator.map(|l| format!(" ({})", l)).unwrap_or_default()
                );
                warn!("{}", message);
                diagnostics.push(Diagnostic {
                    block_id: None,
                    message,
                });
            }
        }
    }
    Ok((table, diagnostics))
}
