//! Per-target driver: declarations, procedure pre-declaration, then one
//! routine per entry point.

use crate::emit::{braced, indent, is_special_block, Diagnostic, EmitMode, Emitter};
use crate::procedures::{is_definition, predeclare};
use crate::project::{Block, Field, Input, ListDecl, Literal, Project, Target, Variable};
use crate::sanitize::{parameter_name, quote_str};
use crate::scope::{CustomBlock, Scope};
use crate::signatures::{Signature, SignatureTable};
use anyhow::{Context, Result};
use serde_json::Value;
use tracing::{info, info_span, warn};

pub const INCLUDE_HEADER: &str = "#include <\"blocks/js\" \"base.js\">";

#[derive(Debug, Clone)]
pub struct CompiledTarget {
    pub name: String,
    pub is_stage: bool,
    pub source: String,
    pub diagnostics: Vec<Diagnostic>,
}

/// Stage variable and list names, as every sprite sees them.
#[derive(Debug, Clone, Default)]
pub struct GlobalBindings {
    bindings: Vec<(String, String)>,
}

impl GlobalBindings {
    /// Derived from the stage's tables in declaration order, which yields the
    /// same names the stage's own declarations get.
    pub fn from_stage(stage: &Target) -> Self {
        let mut scope = Scope::new(true);
        for (id, variable) in &stage.variables {
            scope.bind_variable(id, &variable.name);
        }
        for (id, list) in &stage.lists {
            scope.bind_variable(id, &list.name);
        }
        Self {
            bindings: scope
                .bindings()
                .map(|(id, name)| (id.to_string(), name.to_string()))
                .collect(),
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.bindings.iter().map(|(id, name)| (id.as_str(), name.as_str()))
    }
}

/// Compiles every target in file order. Each target gets a fresh scope.
pub fn decompile_project(project: &Project, table: &SignatureTable) -> Result<Vec<CompiledTarget>> {
    let globals = project
        .targets
        .iter()
        .find(|t| t.is_stage)
        .map(GlobalBindings::from_stage)
        .unwrap_or_default();
    let none = GlobalBindings::default();

    let mut compiled = Vec::with_capacity(project.targets.len());
    for target in &project.targets {
        let visible = if target.is_stage { &none } else { &globals };
        let result = compile_target(table, target, visible)
            .with_context(|| format!("Failed to decompile target '{}'.", target.name))?;
        info!(
            target = %result.name,
            diagnostics = result.diagnostics.len(),
            "decompiled target"
        );
        compiled.push(result);
    }
    Ok(compiled)
}

pub fn compile_target(
    table: &SignatureTable,
    target: &Target,
    globals: &GlobalBindings,
) -> Result<CompiledTarget> {
    let _span = info_span!("target", name = %target.name).entered();
    let mut scope = Scope::new(target.is_stage);
    for (id, name) in globals.iter() {
        scope.inherit_binding(id, name);
    }
    let mut emitter = Emitter::new(table, &target.blocks);
    let mut code = String::from(INCLUDE_HEADER);

    for (id, variable) in &target.variables {
        let declaration = emitter.emit_declaration(&mut scope, &initial_value_block(id, variable))?;
        code.push('\n');
        code.push_str(&declaration);
    }
    for (id, list) in &target.lists {
        code.push('\n');
        code.push_str(&list_declaration(&mut scope, id, list));
    }

    let mut diagnostics = emitter.take_diagnostics();
    predeclare(&mut scope, &target.blocks, &mut diagnostics)?;

    let mut top_level = target.blocks.values().filter(|b| b.top_level).collect::<Vec<_>>();
    top_level.sort_by_key(|b| !is_definition(b));

    for block in top_level {
        if block.opcode.starts_with("argument_reporter_") {
            continue;
        }
        if is_definition(block) {
            // Later definitions of an already registered proccode were
            // reported by `predeclare` and are not emitted.
            if let Some(custom) = scope.custom_block_defined_by(&block.id).cloned() {
                code.push_str(&procedure_declaration(&mut emitter, &scope, &custom, block)?);
            }
            continue;
        }
        match table.lookup(&block.opcode) {
            Some(signature) if signature.is_hat() => {
                code.push_str(&hat_script(&mut emitter, &mut scope, block, signature)?);
            }
            Some(_) => {}
            None if is_special_block(block) => {}
            None => {
                let message = format!("undefined definition for {}", block.opcode);
                warn!(block = %block.id, "{}", message);
                diagnostics.push(Diagnostic {
                    block_id: Some(block.id.clone()),
                    message,
                });
                code.push_str(&format!("\n/* undefined definition for {} */", block.opcode));
            }
        }
    }
    diagnostics.extend(emitter.take_diagnostics());

    Ok(CompiledTarget {
        name: target.name.clone(),
        is_stage: target.is_stage,
        source: code,
        diagnostics,
    })
}

fn initial_value_block(id: &str, variable: &Variable) -> Block {
    let mut block = Block::new(format!("{}:initial", id), "data_setvariableto");
    block.fields.insert(
        "VARIABLE".to_string(),
        Field {
            value: variable.name.clone(),
            id: Some(id.to_string()),
        },
    );
    block.inputs.insert(
        "VALUE".to_string(),
        Input::Literal(Literal::from_json(&variable.value)),
    );
    block
}

fn list_declaration(scope: &mut Scope, id: &str, list: &ListDecl) -> String {
    let keyword = if scope.is_stage() { "global list" } else { "list" };
    let name = scope.bind_variable(id, &list.name);
    if list.items.is_empty() {
        return format!("{} {} = {{}}", keyword, name);
    }
    let items = list.items.iter().map(list_item).collect::<Vec<_>>().join(",\n");
    format!("{} {} = {}", keyword, name, braced(&indent(1, &items)))
}

fn list_item(value: &Value) -> String {
    match value {
        Value::Number(n) => n.to_string(),
        Value::String(s) => quote_str(s),
        other => quote_str(&other.to_string()),
    }
}

fn hat_script(
    emitter: &mut Emitter<'_>,
    scope: &mut Scope,
    block: &Block,
    signature: &Signature,
) -> Result<String> {
    let head = emitter.render_call_form(scope, block, &block.opcode, &signature.slots)?;
    let body = match &block.next {
        Some(next) => emitter.emit(scope, next, 1, EmitMode::CHAIN)?,
        None => String::new(),
    };
    Ok(format!("\n{} {}", head, braced(&body)))
}

fn procedure_declaration(
    emitter: &mut Emitter<'_>,
    scope: &Scope,
    custom: &CustomBlock,
    definition: &Block,
) -> Result<String> {
    let mut body_scope = scope.fork();
    let params = custom
        .arguments
        .iter()
        .zip(&custom.argument_names)
        .map(|(id, name)| {
            let param = parameter_name(name);
            body_scope.inherit_binding(id, &param);
            param
        })
        .collect::<Vec<_>>();

    let body = match &definition.next {
        Some(next) => emitter.emit(&mut body_scope, next, 1, EmitMode::CHAIN)?,
        None => String::new(),
    };
    let warp = if custom.warp { "warp " } else { "" };
    Ok(format!(
        "\n{}fn {}({}) {}",
        warp,
        custom.name,
        params.join(", "),
        braced(&body)
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::project::project_from_json;
    use serde_json::json;

    fn compile_single(target: Value) -> CompiledTarget {
        let project = project_from_json(&json!({ "targets": [target] })).unwrap();
        let table = SignatureTable::builtin();
        decompile_project(&project, &table).unwrap().remove(0)
    }

    #[test]
    fn declares_variables_then_emits_hat_bodies() {
        let compiled = compile_single(json!({
            "name": "Player",
            "isStage": false,
            "variables": {"v1": ["score", 0]},
            "lists": {},
            "blocks": {
                "hat": {"opcode": "event_whenflagclicked", "next": "set", "topLevel": true},
                "set": {
                    "opcode": "data_setvariableto",
                    "next": null,
                    "inputs": {"VALUE": [3, "add", [10, "0"]]},
                    "fields": {"VARIABLE": ["score", "v1"]}
                },
                "add": {
                    "opcode": "operator_add",
                    "inputs": {"NUM1": [3, [12, "score", "v1"], [4, ""]], "NUM2": [1, [4, "1"]]},
                    "fields": {}
                }
            }
        }));
        assert_eq!(
            compiled.source,
            "#include <\"blocks/js\" \"base.js\">\nvar score = 0\nevent_whenflagclicked() {\n\tscore = operator_add(score, 1)\n}"
        );
        assert!(compiled.diagnostics.is_empty());
    }

    #[test]
    fn forward_references_resolve_through_pre_declaration() {
        let compiled = compile_single(json!({
            "name": "Sprite1",
            "isStage": false,
            "variables": {},
            "lists": {},
            "blocks": {
                "defA": {"opcode": "procedures_definition", "next": "callB", "topLevel": true,
                         "inputs": {"custom_block": [1, "protoA"]}},
                "protoA": {"opcode": "procedures_prototype", "mutation": {
                    "proccode": "A", "argumentids": "[]", "argumentnames": "[]", "warp": "false"}},
                "callB": {"opcode": "procedures_call", "mutation": {"proccode": "B"}},
                "defB": {"opcode": "procedures_definition", "next": "callA", "topLevel": true,
                         "inputs": {"custom_block": [1, "protoB"]}},
                "protoB": {"opcode": "procedures_prototype", "mutation": {
                    "proccode": "B", "argumentids": "[]", "argumentnames": "[]", "warp": "true"}},
                "callA": {"opcode": "procedures_call", "mutation": {"proccode": "A"}}
            }
        }));
        assert!(compiled.diagnostics.is_empty(), "{:?}", compiled.diagnostics);
        assert!(compiled.source.contains("\nfn A() {\n\tB()\n}"));
        assert!(compiled.source.contains("\nwarp fn B() {\n\tA()\n}"));
    }

    #[test]
    fn procedures_come_first_and_locals_stay_inside() {
        let compiled = compile_single(json!({
            "name": "Sprite1",
            "isStage": false,
            "variables": {},
            "lists": {},
            "blocks": {
                "hat": {"opcode": "event_whenflagclicked", "next": "call", "topLevel": true},
                "call": {"opcode": "procedures_call", "next": "set2",
                         "inputs": {"argX": [1, [4, "5"]]},
                         "mutation": {"proccode": "grow %s"}},
                "set2": {"opcode": "data_setvariableto", "inputs": {"VALUE": [1, [10, "b"]]},
                         "fields": {"VARIABLE": ["tmp", "t1"]}},
                "def": {"opcode": "procedures_definition", "next": "set1", "topLevel": true,
                        "inputs": {"custom_block": [1, "proto"]}},
                "proto": {"opcode": "procedures_prototype", "mutation": {
                    "proccode": "grow %s", "argumentids": "[\"argX\"]",
                    "argumentnames": "[\"amount\"]", "warp": "false"}},
                "set1": {"opcode": "data_setvariableto", "inputs": {"VALUE": [3, "arg", [10, ""]]},
                         "fields": {"VARIABLE": ["tmp", "t1"]}},
                "arg": {"opcode": "argument_reporter_string_number", "fields": {"VALUE": ["amount", null]}},
                "loose": {"opcode": "argument_reporter_string_number", "topLevel": true,
                          "fields": {"VALUE": ["amount", null]}},
                "frag": {"opcode": "looks_show", "topLevel": true}
            }
        }));
        assert_eq!(
            compiled.source,
            "#include <\"blocks/js\" \"base.js\">\
             \nfn grow(amount) {\n\tvar tmp = amount\n}\
             \nevent_whenflagclicked() {\n\tgrow(5)\n\tvar tmp = \"b\"\n}"
        );
    }

    #[test]
    fn stage_globals_are_declared_once_and_shared() {
        let project = project_from_json(&json!({"targets": [
            {
                "name": "Stage", "isStage": true,
                "variables": {"g": ["high score", 10]},
                "lists": {"l": ["names", ["a", 2]]},
                "blocks": {}
            },
            {
                "name": "Cat", "isStage": false,
                "variables": {"own": ["high score", "x"]},
                "lists": {},
                "blocks": {
                    "hat": {"opcode": "event_whenthisspriteclicked", "next": "set", "topLevel": true},
                    "set": {"opcode": "data_setvariableto", "inputs": {"VALUE": [1, [4, "1"]]},
                            "fields": {"VARIABLE": ["high score", "g"]}}
                }
            }
        ]}))
        .unwrap();
        let compiled = decompile_project(&project, &SignatureTable::builtin()).unwrap();
        assert_eq!(
            compiled[0].source,
            "#include <\"blocks/js\" \"base.js\">\nglobal var high_score = 10\nglobal list names = {\n\t\"a\",\n\t2\n}"
        );
        assert_eq!(
            compiled[1].source,
            "#include <\"blocks/js\" \"base.js\">\nvar high_score_ = \"x\"\nevent_whenthisspriteclicked() {\n\thigh_score = 1\n}"
        );
    }

    #[test]
    fn unknown_top_level_opcodes_leave_a_placeholder() {
        let compiled = compile_single(json!({
            "name": "S", "isStage": false, "variables": {}, "lists": {},
            "blocks": {"x": {"opcode": "ghost_whenSummoned", "topLevel": true}}
        }));
        assert!(compiled
            .source
            .ends_with("\n/* undefined definition for ghost_whenSummoned */"));
        assert_eq!(compiled.diagnostics.len(), 1);
    }

    #[test]
    fn broken_prototypes_abort_the_run() {
        let project = project_from_json(&json!({"targets": [{
            "name": "S", "isStage": false, "variables": {}, "lists": {},
            "blocks": {"def": {"opcode": "procedures_definition", "topLevel": true, "inputs": {}}}
        }]}))
        .unwrap();
        let err = decompile_project(&project, &SignatureTable::builtin()).unwrap_err();
        assert!(format!("{:#}", err).contains("custom_block"));
    }

    #[test]
    fn duplicate_proccodes_emit_only_the_first_definition() {
        let compiled = compile_single(json!({
            "name": "S", "isStage": false, "variables": {}, "lists": {},
            "blocks": {
                "d1": {"opcode": "procedures_definition", "next": "show", "topLevel": true,
                       "inputs": {"custom_block": [1, "p1"]}},
                "p1": {"opcode": "procedures_prototype", "mutation": {
                    "proccode": "go %s", "argumentids": "[\"a\"]",
                    "argumentnames": "[\"x\"]", "warp": "false"}},
                "show": {"opcode": "looks_show"},
                "d2": {"opcode": "procedures_definition", "next": "hide", "topLevel": true,
                       "inputs": {"custom_block": [1, "p2"]}},
                "p2": {"opcode": "procedures_prototype", "mutation": {
                    "proccode": "go %s", "argumentids": "[\"b\"]",
                    "argumentnames": "[\"y\"]", "warp": "false"}},
                "hide": {"opcode": "looks_hide"}
            }
        }));
        assert_eq!(compiled.source.matches("fn go(").count(), 1);
        assert!(compiled.source.contains("\nfn go(x) {\n\tlooks_show()\n}"));
        assert!(!compiled.source.contains("looks_hide"));
        assert_eq!(compiled.diagnostics.len(), 1);
        assert_eq!(compiled.diagnostics[0].block_id.as_deref(), Some("d2"));
    }

    #[test]
    fn reserved_parameter_names_agree_between_header_and_body() {
        let compiled = compile_single(json!({
            "name": "S", "isStage": false, "variables": {}, "lists": {},
            "blocks": {
                "def": {"opcode": "procedures_definition", "next": "say", "topLevel": true,
                        "inputs": {"custom_block": [1, "proto"]}},
                "proto": {"opcode": "procedures_prototype", "mutation": {
                    "proccode": "check %b", "argumentids": "[\"c\"]",
                    "argumentnames": "[\"if\"]", "warp": "true"}},
                "say": {"opcode": "looks_say", "inputs": {"MESSAGE": [3, "arg", [10, ""]]}},
                "arg": {"opcode": "argument_reporter_boolean", "fields": {"VALUE": ["if", null]}}
            }
        }));
        assert!(compiled
            .source
            .ends_with("\nwarp fn check(if_) {\n\tlooks_say(if_)\n}"));
    }

    #[test]
    fn deeply_nested_reporters_fail_with_an_error() {
        let depth = 5_000;
        let mut blocks = serde_json::Map::new();
        blocks.insert(
            "hat".into(),
            json!({"opcode": "event_whenflagclicked", "next": "say", "topLevel": true}),
        );
        blocks.insert(
            "say".into(),
            json!({"opcode": "looks_say", "inputs": {"MESSAGE": [3, "n0", [10, ""]]}}),
        );
        for i in 0..depth {
            let operand = if i + 1 < depth {
                json!({"OPERAND": [2, format!("n{}", i + 1)]})
            } else {
                json!({})
            };
            blocks.insert(
                format!("n{}", i),
                json!({"opcode": "operator_not", "inputs": operand}),
            );
        }
        let project = project_from_json(&json!({"targets": [{
            "name": "Deep", "isStage": false, "variables": {}, "lists": {},
            "blocks": Value::Object(blocks)
        }]}))
        .unwrap();
        let err = decompile_project(&project, &SignatureTable::builtin()).unwrap_err();
        let message = format!("{:#}", err);
        assert!(message.contains("Deep"));
        assert!(message.contains("nesting deeper than"));
    }
}
