//! Expression and statement emission.
//!
//! [`Emitter::emit`] renders one block (and, in chain mode, everything after
//! it) straight to source text. Scope is resolved and updated on the way:
//! variables seen for the first time get their declaration here.

use crate::project::{Block, BlockMap, Field, Input, Literal, LiteralKind};
use crate::sanitize::{parameter_name, quote_str, sanitize};
use crate::scope::Scope;
use crate::signatures::{is_menu_block, Category, SignatureTable};
use anyhow::{anyhow, bail, Result};
use std::collections::HashSet;
use tracing::warn;

/// Calls to this procedure are a logging helper and are dropped.
pub const LOG_SENTINEL_PROCCODE: &str = "\u{200b}\u{200b}log\u{200b}\u{200b} %s";

const EMPTY_STRING: &str = "\"\"";

/// Deepest chain of nested inputs and branch bodies that is rendered.
pub const MAX_NESTING: usize = 256;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnostic {
    pub block_id: Option<String>,
    pub message: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EmitMode {
    /// Render a branch construct as its head call only.
    pub ignore_branch: bool,
    /// Continue through `next` links.
    pub follow_next: bool,
}

impl EmitMode {
    pub const CHAIN: Self = Self {
        ignore_branch: false,
        follow_next: true,
    };
    pub const SINGLE: Self = Self {
        ignore_branch: false,
        follow_next: false,
    };
    pub const VALUE: Self = Self {
        ignore_branch: true,
        follow_next: false,
    };
}

pub struct Emitter<'a> {
    table: &'a SignatureTable,
    blocks: &'a BlockMap,
    path: HashSet<String>,
    depth: usize,
    diagnostics: Vec<Diagnostic>,
}

impl<'a> Emitter<'a> {
    pub fn new(table: &'a SignatureTable, blocks: &'a BlockMap) -> Self {
        Self {
            table,
            blocks,
            path: HashSet::new(),
            depth: 0,
            diagnostics: Vec::new(),
        }
    }

    pub fn diagnostics(&self) -> &[Diagnostic] {
        &self.diagnostics
    }

    pub fn take_diagnostics(&mut self) -> Vec<Diagnostic> {
        std::mem::take(&mut self.diagnostics)
    }

    pub fn block(&self, id: &str) -> Result<&'a Block> {
        let blocks: &'a BlockMap = self.blocks;
        blocks
            .get(id)
            .ok_or_else(|| anyhow!("Missing block '{}'.", id))
    }

    /// Renders `id` indented by `level` tabs. With `mode.follow_next` the
    /// successor chain is appended one statement per line.
    pub fn emit(&mut self, scope: &mut Scope, id: &str, level: usize, mode: EmitMode) -> Result<String> {
        if self.depth >= MAX_NESTING {
            bail!("Block nesting deeper than {} at '{}'.", MAX_NESTING, id);
        }
        self.depth += 1;
        let result = self.emit_chain(scope, id, level, mode);
        self.depth -= 1;
        result
    }

    fn emit_chain(&mut self, scope: &mut Scope, id: &str, level: usize, mode: EmitMode) -> Result<String> {
        let mut lines = Vec::new();
        let mut entered = Vec::new();
        let mut current = Some(id.to_string());
        while let Some(block_id) = current {
            let block = self.block(&block_id)?;
            if !self.path.insert(block_id.clone()) {
                bail!("Cyclic block reference through '{}'.", block_id);
            }
            entered.push(block_id);
            let text = self.render_block(scope, block, mode)?;
            if !text.is_empty() {
                lines.push(text);
            }
            current = if mode.follow_next {
                block.next.clone()
            } else {
                None
            };
        }
        for block_id in entered {
            self.path.remove(&block_id);
        }
        Ok(indent(level, &lines.join("\n")))
    }

    /// Emits a variable assignment that always carries a declaration prefix.
    /// Used for the initial value of each declared variable.
    pub fn emit_declaration(&mut self, scope: &mut Scope, block: &Block) -> Result<String> {
        self.render_set_variable(scope, block, true)
    }

    /// `name(arg0, arg1, ...)` with arguments taken from `slots` in order.
    pub fn render_call_form(
        &mut self,
        scope: &mut Scope,
        block: &Block,
        name: &str,
        slots: &[String],
    ) -> Result<String> {
        let mut args = Vec::with_capacity(slots.len());
        for slot in slots {
            if let Some(arg) = self.render_slot(scope, block, slot)? {
                args.push(arg);
            }
        }
        Ok(format!("{}({})", name, args.join(", ")))
    }

    fn render_block(&mut self, scope: &mut Scope, block: &Block, mode: EmitMode) -> Result<String> {
        match block.opcode.as_str() {
            "operator_notequal" => {
                let left = self.render_slot_or_empty(scope, block, "OPERAND1")?;
                let right = self.render_slot_or_empty(scope, block, "OPERAND2")?;
                return Ok(format!("{} != {}", left, right));
            }
            "procedures_return" => {
                let slot = if block.inputs.contains_key("return") {
                    "return"
                } else {
                    "VALUE"
                };
                let value = self.render_slot_or_empty(scope, block, slot)?;
                return Ok(format!("return {}", value));
            }
            "procedures_call" => return self.render_procedure_call(scope, block),
            "data_setvariableto" => return self.render_set_variable(scope, block, false),
            op if op.starts_with("argument_reporter_") => {
                return Ok(parameter_name(block.field_value("VALUE").unwrap_or_default()));
            }
            op if is_menu_block(op, block.shadow) => {
                let value = block.first_field().map(|f| f.value.as_str()).unwrap_or_default();
                return Ok(quote_str(value));
            }
            _ => {}
        }

        let table: &'a SignatureTable = self.table;
        let Some(signature) = table.lookup(&block.opcode) else {
            self.diagnose(block, format!("undefined definition for {}", block.opcode));
            return Ok(format!("/* undefined definition for {} */", block.opcode));
        };
        if let Category::Branch(sockets) = &signature.category {
            if !mode.ignore_branch {
                return self.render_branch(scope, block, &signature.slots, sockets);
            }
        }
        self.render_call_form(scope, block, &block.opcode, &signature.slots)
    }

    fn render_branch(
        &mut self,
        scope: &mut Scope,
        block: &Block,
        slots: &[String],
        sockets: &[String],
    ) -> Result<String> {
        let head = self.render_call_form(scope, block, &block.opcode, slots)?;
        let mut bodies = Vec::with_capacity(sockets.len());
        for socket in sockets {
            let body = match block.input_block_id(socket) {
                Some(id) => self.emit(scope, id, 1, EmitMode::CHAIN)?,
                None => String::new(),
            };
            bodies.push(braced(&body));
        }
        Ok(format!("{} {}", head, bodies.join(" ")))
    }

    fn render_procedure_call(&mut self, scope: &mut Scope, block: &Block) -> Result<String> {
        let proccode = block
            .mutation
            .as_ref()
            .and_then(|m| m.proccode.as_deref())
            .unwrap_or_default();
        if proccode == LOG_SENTINEL_PROCCODE {
            return Ok(String::new());
        }
        let Some(custom) = scope.custom_block(proccode).cloned() else {
            self.diagnose(
                block,
                format!("custom block of proccode \"{}\" not found", proccode),
            );
            return Ok(format!("/* unknown custom block {} */", proccode));
        };
        self.render_call_form(scope, block, &custom.name, &custom.arguments)
    }

    fn render_set_variable(&mut self, scope: &mut Scope, block: &Block, force: bool) -> Result<String> {
        let Some(field) = block.fields.get("VARIABLE") else {
            self.diagnose(block, "variable assignment without a VARIABLE field".to_string());
            return Ok("/* variable assignment without a variable */".to_string());
        };
        let id = field.id.as_deref().unwrap_or(&field.value);
        let declare = force || !scope.is_declared(id);
        let value = self.render_slot_or_empty(scope, block, "VALUE")?;
        let name = scope.bind_variable(id, &field.value);
        let prefix = match (declare, scope.is_stage()) {
            (false, _) => "",
            (true, true) => "global var ",
            (true, false) => "var ",
        };
        Ok(format!("{}{} = {}", prefix, name, value))
    }

    /// `None` means the argument is dropped from the argument list.
    fn render_slot(&mut self, scope: &mut Scope, block: &Block, slot: &str) -> Result<Option<String>> {
        if let Some(input) = block.inputs.get(slot) {
            return self.render_input(scope, block, input);
        }
        if let Some(field) = block.fields.get(slot) {
            return Ok(Some(render_field(scope, slot, field)));
        }
        Ok(Some(EMPTY_STRING.to_string()))
    }

    fn render_slot_or_empty(&mut self, scope: &mut Scope, block: &Block, slot: &str) -> Result<String> {
        Ok(self
            .render_slot(scope, block, slot)?
            .unwrap_or_else(|| EMPTY_STRING.to_string()))
    }

    pub fn render_input(&mut self, scope: &mut Scope, owner: &Block, input: &Input) -> Result<Option<String>> {
        match input {
            Input::Reference(id) => self.emit(scope, id, 0, EmitMode::VALUE).map(Some),
            Input::Literal(lit) => Ok(self.render_literal(scope, owner, lit)),
        }
    }

    fn render_literal(&mut self, scope: &Scope, owner: &Block, lit: &Literal) -> Option<String> {
        match lit.kind {
            kind if kind.is_numeric() => Some(render_number(&lit.value)),
            LiteralKind::Color | LiteralKind::Text | LiteralKind::Broadcast => Some(quote_str(&lit.value)),
            LiteralKind::Variable | LiteralKind::List => Some(bound_name(scope, lit.id.as_deref(), &lit.value)),
            other => {
                self.diagnose(owner, format!("INPUT TYPE {} NOT IMPLEMENTED", other.code()));
                None
            }
        }
    }

    fn diagnose(&mut self, block: &Block, message: String) {
        warn!(block = %block.id, opcode = %block.opcode, "{}", message);
        self.diagnostics.push(Diagnostic {
            block_id: Some(block.id.clone()),
            message,
        });
    }
}

fn render_field(scope: &Scope, slot: &str, field: &Field) -> String {
    match slot {
        "VARIABLE" | "LIST" => bound_name(scope, field.id.as_deref(), &field.value),
        _ => quote_str(&field.value),
    }
}

fn bound_name(scope: &Scope, id: Option<&str>, raw: &str) -> String {
    id.and_then(|id| scope.variable_name(id))
        .map(ToString::to_string)
        .unwrap_or_else(|| sanitize(raw))
}

/// Bare only for decimal notation; `inf`, `nan` and the like are quoted.
fn render_number(raw: &str) -> String {
    let trimmed = raw.trim();
    let decimal = trimmed
        .chars()
        .all(|c| c.is_ascii_digit() || matches!(c, '+' | '-' | '.' | 'e' | 'E'));
    if trimmed.is_empty() {
        "0".to_string()
    } else if decimal && trimmed.parse::<f64>().is_ok() {
        trimmed.to_string()
    } else {
        quote_str(raw)
    }
}

/// Blocks rendered without a signature table entry.
pub fn is_special_block(block: &Block) -> bool {
    let opcode = block.opcode.as_str();
    matches!(
        opcode,
        "operator_notequal" | "procedures_return" | "procedures_call" | "procedures_prototype"
    ) || opcode.starts_with("argument_reporter_")
        || is_menu_block(opcode, block.shadow)
}

/// `{`, the body, `}` each on their own line.
pub fn braced(body: &str) -> String {
    format!("{{\n{}\n}}", body)
}

/// Prefixes every non-empty line with `level` tabs.
pub fn indent(level: usize, code: &str) -> String {
    if level == 0 {
        return code.to_string();
    }
    let prefix = "\t".repeat(level);
    code.split('\n')
        .map(|line| {
            if line.is_empty() {
                String::new()
            } else {
                format!("{}{}", prefix, line)
            }
        })
        .collect::<Vec<_>>()
        .join("\n")
}
