//! Typed view of an extracted `project.json`.
//!
//! Only the parts the decompiler reads are modelled. JSON object order is
//! preserved so that block, variable and list iteration follows the file.

use anyhow::{anyhow, Context, Result};
use indexmap::IndexMap;
use serde_json::{Map, Value};

pub type BlockMap = IndexMap<String, Block>;

#[derive(Debug, Clone)]
pub struct Project {
    pub targets: Vec<Target>,
    pub extensions: Vec<String>,
    pub extension_urls: IndexMap<String, String>,
}

#[derive(Debug, Clone)]
pub struct Target {
    pub name: String,
    pub is_stage: bool,
    pub blocks: BlockMap,
    pub variables: IndexMap<String, Variable>,
    pub lists: IndexMap<String, ListDecl>,
    pub costumes: Vec<Asset>,
    pub sounds: Vec<Asset>,
}

#[derive(Debug, Clone)]
pub struct Variable {
    pub name: String,
    pub value: Value,
}

#[derive(Debug, Clone)]
pub struct ListDecl {
    pub name: String,
    pub items: Vec<Value>,
}

/// A costume or sound descriptor. The payload lives next to `project.json`
/// as `<asset_id>.<data_format>`.
#[derive(Debug, Clone)]
pub struct Asset {
    pub name: String,
    pub asset_id: String,
    pub data_format: String,
    pub md5ext: String,
}

impl Asset {
    pub fn file_name(&self) -> String {
        if self.md5ext.is_empty() {
            format!("{}.{}", self.asset_id, self.data_format)
        } else {
            self.md5ext.clone()
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct Block {
    pub id: String,
    pub opcode: String,
    pub next: Option<String>,
    pub inputs: IndexMap<String, Input>,
    pub fields: IndexMap<String, Field>,
    pub shadow: bool,
    pub top_level: bool,
    pub mutation: Option<Mutation>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Input {
    Literal(Literal),
    Reference(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LiteralKind {
    Number,
    PositiveNumber,
    WholeNumber,
    Integer,
    Angle,
    Color,
    Text,
    Broadcast,
    Variable,
    List,
    Other(i64),
}

impl LiteralKind {
    pub fn from_code(code: i64) -> Self {
        match code {
            4 => Self::Number,
            5 => Self::PositiveNumber,
            6 => Self::WholeNumber,
            7 => Self::Integer,
            8 => Self::Angle,
            9 => Self::Color,
            10 => Self::Text,
            11 => Self::Broadcast,
            12 => Self::Variable,
            13 => Self::List,
            other => Self::Other(other),
        }
    }

    pub fn code(self) -> i64 {
        match self {
            Self::Number => 4,
            Self::PositiveNumber => 5,
            Self::WholeNumber => 6,
            Self::Integer => 7,
            Self::Angle => 8,
            Self::Color => 9,
            Self::Text => 10,
            Self::Broadcast => 11,
            Self::Variable => 12,
            Self::List => 13,
            Self::Other(code) => code,
        }
    }

    pub fn is_numeric(self) -> bool {
        matches!(
            self,
            Self::Number | Self::PositiveNumber | Self::WholeNumber | Self::Integer | Self::Angle
        )
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Literal {
    pub kind: LiteralKind,
    pub value: String,
    pub id: Option<String>,
}

impl Literal {
    pub fn new(kind: LiteralKind, value: impl Into<String>) -> Self {
        Self {
            kind,
            value: value.into(),
            id: None,
        }
    }

    /// Literal for a variable's initial value: numbers stay numeric, everything
    /// else becomes text.
    pub fn from_json(value: &Value) -> Self {
        match value {
            Value::Number(n) => Self::new(LiteralKind::Number, n.to_string()),
            Value::String(s) => Self::new(LiteralKind::Text, s.clone()),
            Value::Bool(b) => Self::new(LiteralKind::Text, b.to_string()),
            Value::Null => Self::new(LiteralKind::Text, ""),
            other => Self::new(LiteralKind::Text, other.to_string()),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Field {
    pub value: String,
    pub id: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Mutation {
    pub proccode: Option<String>,
    pub argument_ids: Option<String>,
    pub argument_names: Option<String>,
    pub warp: bool,
}

impl Mutation {
    pub fn parse_argument_ids(&self) -> Result<Vec<String>> {
        parse_string_list(self.argument_ids.as_deref(), "argumentids")
    }

    pub fn parse_argument_names(&self) -> Result<Vec<String>> {
        parse_string_list(self.argument_names.as_deref(), "argumentnames")
    }
}

fn parse_string_list(raw: Option<&str>, key: &str) -> Result<Vec<String>> {
    let raw = raw.ok_or_else(|| anyhow!("mutation missing '{}'.", key))?;
    serde_json::from_str::<Vec<String>>(raw)
        .with_context(|| format!("mutation '{}' is not a JSON string list: {}", key, raw))
}

impl Block {
    pub fn new(id: impl Into<String>, opcode: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            opcode: opcode.into(),
            ..Self::default()
        }
    }

    /// Id of the block referenced by an input slot, if the slot holds a reference.
    pub fn input_block_id(&self, name: &str) -> Option<&str> {
        match self.inputs.get(name)? {
            Input::Reference(id) => Some(id.as_str()),
            Input::Literal(_) => None,
        }
    }

    pub fn field_value(&self, name: &str) -> Option<&str> {
        self.fields.get(name).map(|f| f.value.as_str())
    }

    pub fn first_field(&self) -> Option<&Field> {
        self.fields.values().next()
    }
}

pub fn parse_project(text: &str) -> Result<Project> {
    let json: Value = serde_json::from_str(text).context("Invalid project.json.")?;
    project_from_json(&json)
}

pub fn project_from_json(json: &Value) -> Result<Project> {
    let targets = json
        .get("targets")
        .and_then(Value::as_array)
        .ok_or_else(|| anyhow!("Invalid project.json: missing 'targets' array."))?
        .iter()
        .map(target_from_json)
        .collect::<Result<Vec<_>>>()?;

    let extensions = json
        .get("extensions")
        .and_then(Value::as_array)
        .map(|arr| {
            arr.iter()
                .filter_map(Value::as_str)
                .map(ToString::to_string)
                .collect()
        })
        .unwrap_or_default();

    let mut extension_urls = IndexMap::new();
    if let Some(urls) = json.get("extensionURLs").and_then(Value::as_object) {
        for (id, url) in urls {
            if let Some(url) = url.as_str() {
                extension_urls.insert(id.clone(), url.to_string());
            }
        }
    }

    Ok(Project {
        targets,
        extensions,
        extension_urls,
    })
}

fn target_from_json(target: &Value) -> Result<Target> {
    let name = target
        .get("name")
        .and_then(Value::as_str)
        .ok_or_else(|| anyhow!("Target missing 'name'."))?
        .to_string();
    let is_stage = target
        .get("isStage")
        .and_then(Value::as_bool)
        .ok_or_else(|| anyhow!("Target '{}' missing isStage.", name))?;

    let mut blocks = BlockMap::new();
    if let Some(obj) = target.get("blocks").and_then(Value::as_object) {
        for (id, raw) in obj {
            // Loose variable/list reporters are stored as bare arrays.
            if raw.is_array() {
                continue;
            }
            let block = block_from_json(id, raw)
                .with_context(|| format!("Target '{}' has an invalid block '{}'.", name, id))?;
            blocks.insert(id.clone(), block);
        }
    }

    let mut variables = IndexMap::new();
    if let Some(obj) = target.get("variables").and_then(Value::as_object) {
        for (id, decl) in obj {
            let arr = decl.as_array();
            let Some(var_name) = arr.and_then(|a| a.first()).and_then(Value::as_str) else {
                continue;
            };
            let value = arr
                .and_then(|a| a.get(1))
                .cloned()
                .unwrap_or(Value::from(0));
            variables.insert(
                id.clone(),
                Variable {
                    name: var_name.to_string(),
                    value,
                },
            );
        }
    }

    let mut lists = IndexMap::new();
    if let Some(obj) = target.get("lists").and_then(Value::as_object) {
        for (id, decl) in obj {
            let arr = decl.as_array();
            let Some(list_name) = arr.and_then(|a| a.first()).and_then(Value::as_str) else {
                continue;
            };
            let items = arr
                .and_then(|a| a.get(1))
                .and_then(Value::as_array)
                .cloned()
                .unwrap_or_default();
            lists.insert(
                id.clone(),
                ListDecl {
                    name: list_name.to_string(),
                    items,
                },
            );
        }
    }

    Ok(Target {
        costumes: read_assets(target.get("costumes")),
        sounds: read_assets(target.get("sounds")),
        name,
        is_stage,
        blocks,
        variables,
        lists,
    })
}

fn read_assets(node: Option<&Value>) -> Vec<Asset> {
    let mut out = Vec::new();
    let Some(arr) = node.and_then(Value::as_array) else {
        return out;
    };
    for asset in arr {
        let Some(asset_id) = asset.get("assetId").and_then(Value::as_str) else {
            continue;
        };
        let text = |key: &str| {
            asset
                .get(key)
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string()
        };
        out.push(Asset {
            name: text("name"),
            asset_id: asset_id.to_string(),
            data_format: text("dataFormat"),
            md5ext: text("md5ext"),
        });
    }
    out
}

pub fn block_from_json(id: &str, raw: &Value) -> Result<Block> {
    let obj = raw
        .as_object()
        .ok_or_else(|| anyhow!("block is not an object"))?;
    let opcode = obj
        .get("opcode")
        .and_then(Value::as_str)
        .ok_or_else(|| anyhow!("block missing 'opcode'"))?
        .to_string();

    let mut inputs = IndexMap::new();
    if let Some(map) = obj.get("inputs").and_then(Value::as_object) {
        for (name, value) in map {
            if let Some(input) = input_from_json(value) {
                inputs.insert(name.clone(), input);
            }
        }
    }

    let mut fields = IndexMap::new();
    if let Some(map) = obj.get("fields").and_then(Value::as_object) {
        for (name, value) in map {
            if let Some(field) = field_from_json(value) {
                fields.insert(name.clone(), field);
            }
        }
    }

    Ok(Block {
        id: id.to_string(),
        opcode,
        next: obj.get("next").and_then(Value::as_str).map(ToString::to_string),
        inputs,
        fields,
        shadow: obj.get("shadow").and_then(Value::as_bool).unwrap_or(false),
        top_level: obj.get("topLevel").and_then(Value::as_bool).unwrap_or(false),
        mutation: obj
            .get("mutation")
            .and_then(Value::as_object)
            .map(mutation_from_json),
    })
}

/// Decodes `[shadow-type, value, shadow-value?]`. A `null` value falls back to
/// the shadow; nothing usable means the slot is absent.
fn input_from_json(value: &Value) -> Option<Input> {
    if let Some(id) = value.as_str() {
        return Some(Input::Reference(id.to_string()));
    }
    let arr = value.as_array()?;
    arr.iter()
        .skip(1)
        .find_map(|candidate| match candidate {
            Value::String(id) => Some(Input::Reference(id.clone())),
            Value::Array(lit) => literal_from_array(lit).map(Input::Literal),
            _ => None,
        })
}

fn literal_from_array(lit: &[Value]) -> Option<Literal> {
    let code = lit.first()?.as_i64()?;
    let value = match lit.get(1) {
        Some(Value::String(s)) => s.clone(),
        Some(Value::Number(n)) => n.to_string(),
        Some(Value::Bool(b)) => b.to_string(),
        _ => String::new(),
    };
    Some(Literal {
        kind: LiteralKind::from_code(code),
        value,
        id: lit.get(2).and_then(Value::as_str).map(ToString::to_string),
    })
}

fn field_from_json(value: &Value) -> Option<Field> {
    if let Some(s) = value.as_str() {
        return Some(Field {
            value: s.to_string(),
            id: None,
        });
    }
    let arr = value.as_array()?;
    let text = match arr.first()? {
        Value::String(s) => s.clone(),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        _ => String::new(),
    };
    Some(Field {
        value: text,
        id: arr.get(1).and_then(Value::as_str).map(ToString::to_string),
    })
}

fn mutation_from_json(obj: &Map<String, Value>) -> Mutation {
    let text = |key: &str| obj.get(key).and_then(Value::as_str).map(ToString::to_string);
    let warp = match obj.get("warp") {
        Some(Value::Bool(b)) => *b,
        Some(Value::String(s)) => s.eq_ignore_ascii_case("true"),
        _ => false,
    };
    Mutation {
        proccode: text("proccode"),
        argument_ids: text("argumentids"),
        argument_names: text("argumentnames"),
        warp,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn decodes_inputs_as_literals_or_references() {
        let block = block_from_json(
            "a",
            &json!({
                "opcode": "motion_gotoxy",
                "next": null,
                "inputs": {
                    "X": [1, [4, "10"]],
                    "Y": [3, "b", [4, ""]],
                    "Z": [1, null],
                    "W": [3, null, [10, "fallback"]]
                },
                "fields": {},
                "topLevel": true
            }),
        )
        .unwrap();
        assert_eq!(
            block.inputs.get("X"),
            Some(&Input::Literal(Literal::new(LiteralKind::Number, "10")))
        );
        assert_eq!(block.input_block_id("Y"), Some("b"));
        assert!(!block.inputs.contains_key("Z"));
        assert_eq!(
            block.inputs.get("W"),
            Some(&Input::Literal(Literal::new(LiteralKind::Text, "fallback")))
        );
        assert!(block.top_level);
    }

    #[test]
    fn reads_mutation_lists_and_warp() {
        let block = block_from_json(
            "p",
            &json!({
                "opcode": "procedures_prototype",
                "inputs": {},
                "fields": {},
                "mutation": {
                    "tagName": "mutation",
                    "proccode": "jump %s",
                    "argumentids": "[\"id1\"]",
                    "argumentnames": "[\"height\"]",
                    "warp": "true"
                }
            }),
        )
        .unwrap();
        let mutation = block.mutation.unwrap();
        assert!(mutation.warp);
        assert_eq!(mutation.parse_argument_ids().unwrap(), vec!["id1"]);
        assert_eq!(mutation.parse_argument_names().unwrap(), vec!["height"]);
    }

    #[test]
    fn keeps_file_order_and_skips_loose_primitives() {
        let project = project_from_json(&json!({
            "targets": [{
                "name": "Stage",
                "isStage": true,
                "variables": {"v2": ["b", 1], "v1": ["a", "x"]},
                "lists": {"l1": ["items", [1, "two"]]},
                "blocks": {
                    "z": {"opcode": "event_whenflagclicked", "topLevel": true},
                    "loose": [12, "a", "v1", 10, 10],
                    "a": {"opcode": "looks_show", "topLevel": true}
                },
                "costumes": [{"name": "bg", "assetId": "abc", "dataFormat": "svg", "md5ext": "abc.svg"}],
                "sounds": []
            }],
            "extensions": ["pen"]
        }))
        .unwrap();
        let stage = &project.targets[0];
        assert_eq!(stage.blocks.keys().collect::<Vec<_>>(), vec!["z", "a"]);
        assert_eq!(stage.variables.keys().collect::<Vec<_>>(), vec!["v2", "v1"]);
        assert_eq!(stage.lists["l1"].items.len(), 2);
        assert_eq!(stage.costumes[0].file_name(), "abc.svg");
        assert_eq!(project.extensions, vec!["pen"]);
    }

    #[test]
    fn rejects_targets_without_stage_flag() {
        let err = project_from_json(&json!({"targets": [{"name": "S"}]})).unwrap_err();
        assert!(err.to_string().contains("isStage"));
    }
}
