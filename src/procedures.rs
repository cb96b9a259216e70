//! Custom procedure prototypes and the pre-declaration pass.
//!
//! Every procedure of a target is registered in scope before any body is
//! emitted, so calls to procedures defined later (or to the procedure
//! itself) resolve.

use crate::emit::Diagnostic;
use crate::project::{Block, BlockMap};
use crate::sanitize::{sanitize, uniquify};
use crate::scope::{CustomBlock, Scope};
use anyhow::{anyhow, bail, Context, Result};
use regex::Regex;
use tracing::{debug, warn};

pub const DEFINITION_OPCODE: &str = "procedures_definition";
const PROTOTYPE_INPUT: &str = "custom_block";

#[derive(Debug, Clone)]
pub struct Prototype {
    pub proccode: String,
    pub argument_ids: Vec<String>,
    pub argument_names: Vec<String>,
    pub warp: bool,
}

pub fn is_definition(block: &Block) -> bool {
    block.opcode == DEFINITION_OPCODE
}

/// Reads the prototype of a `procedures_definition`. Any missing piece is
/// fatal.
pub fn resolve_prototype(blocks: &BlockMap, definition: &Block) -> Result<Prototype> {
    let prototype_id = definition.input_block_id(PROTOTYPE_INPUT).ok_or_else(|| {
        anyhow!(
            "Procedure definition '{}' missing {} input.",
            definition.id,
            PROTOTYPE_INPUT
        )
    })?;
    let prototype = blocks
        .get(prototype_id)
        .ok_or_else(|| anyhow!("Missing block '{}'.", prototype_id))?;
    let mutation = prototype
        .mutation
        .as_ref()
        .ok_or_else(|| anyhow!("Procedure prototype '{}' missing mutation.", prototype_id))?;
    let proccode = mutation
        .proccode
        .clone()
        .ok_or_else(|| anyhow!("Procedure prototype '{}' missing proccode.", prototype_id))?;
    let argument_ids = mutation
        .parse_argument_ids()
        .with_context(|| format!("Procedure prototype '{}' has bad arguments.", prototype_id))?;
    let argument_names = mutation
        .parse_argument_names()
        .with_context(|| format!("Procedure prototype '{}' has bad arguments.", prototype_id))?;
    if argument_ids.len() != argument_names.len() {
        bail!(
            "Procedure prototype '{}' lists {} argument ids but {} argument names.",
            prototype_id,
            argument_ids.len(),
            argument_names.len()
        );
    }
    Ok(Prototype {
        proccode,
        argument_ids,
        argument_names,
        warp: mutation.warp,
    })
}

pub fn proccode_pattern() -> Result<Regex> {
    Ok(Regex::new(r"^(.*?) %")?)
}

/// Text before the first parameter placeholder, or the whole proccode when
/// it has no parameters.
pub fn proccode_name(pattern: &Regex, proccode: &str) -> String {
    pattern
        .captures(proccode)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str())
        .unwrap_or(proccode)
        .trim()
        .to_string()
}

pub fn predeclare(scope: &mut Scope, blocks: &BlockMap, diagnostics: &mut Vec<Diagnostic>) -> Result<()> {
    let pattern = proccode_pattern()?;
    for definition in blocks.values().filter(|b| b.top_level && is_definition(b)) {
        let prototype = resolve_prototype(blocks, definition)?;
        if scope.custom_block(&prototype.proccode).is_some() {
            let message = format!("procedure \"{}\" is defined more than once", prototype.proccode);
            warn!(block = %definition.id, "{}", message);
            diagnostics.push(Diagnostic {
                block_id: Some(definition.id.clone()),
                message,
            });
            continue;
        }
        let name = uniquify(sanitize(&proccode_name(&pattern, &prototype.proccode)), scope);
        debug!(proccode = %prototype.proccode, %name, "pre-declared procedure");
        scope.register_custom_block(
            &prototype.proccode,
            CustomBlock {
                definition_id: definition.id.clone(),
                name,
                arguments: prototype.argument_ids,
                argument_names: prototype.argument_names,
                warp: prototype.warp,
            },
        );
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::project::{Input, Mutation};

    fn definition(id: &str, prototype: &str) -> Block {
        let mut block = Block::new(id, DEFINITION_OPCODE);
        block.top_level = true;
        block
            .inputs
            .insert(PROTOTYPE_INPUT.into(), Input::Reference(prototype.into()));
        block
    }

    fn prototype(id: &str, proccode: &str, ids: &str, names: &str) -> Block {
        let mut block = Block::new(id, "procedures_prototype");
        block.mutation = Some(Mutation {
            proccode: Some(proccode.into()),
            argument_ids: Some(ids.into()),
            argument_names: Some(names.into()),
            warp: false,
        });
        block
    }

    fn map(blocks: Vec<Block>) -> BlockMap {
        blocks.into_iter().map(|b| (b.id.clone(), b)).collect()
    }

    #[test]
    fn names_come_from_text_before_the_first_placeholder() {
        let pattern = proccode_pattern().unwrap();
        assert_eq!(proccode_name(&pattern, "move to %s and %n"), "move to");
        assert_eq!(proccode_name(&pattern, "reset"), "reset");
    }

    #[test]
    fn registers_every_procedure_before_emission() {
        let blocks = map(vec![
            definition("da", "pa"),
            prototype("pa", "draw square %s", "[\"s\"]", "[\"size\"]"),
            definition("db", "pb"),
            prototype("pb", "draw-square %s", "[\"t\"]", "[\"n\"]"),
            definition("dc", "pc"),
            prototype("pc", "if", "[]", "[]"),
        ]);
        let mut scope = Scope::new(false);
        let mut diagnostics = Vec::new();
        predeclare(&mut scope, &blocks, &mut diagnostics).unwrap();
        assert_eq!(scope.custom_block("draw square %s").unwrap().name, "draw_square");
        assert_eq!(scope.custom_block("draw-square %s").unwrap().name, "draw_square_");
        assert_eq!(scope.custom_block("if").unwrap().name, "if_");
        assert_eq!(scope.custom_block("draw-square %s").unwrap().arguments, vec!["t"]);
        assert!(diagnostics.is_empty());
    }

    #[test]
    fn duplicate_proccodes_keep_the_first_registration() {
        let blocks = map(vec![
            definition("da", "pa"),
            prototype("pa", "go %s", "[\"a\"]", "[\"x\"]"),
            definition("db", "pb"),
            prototype("pb", "go %s", "[\"b\"]", "[\"y\"]"),
        ]);
        let mut scope = Scope::new(false);
        let mut diagnostics = Vec::new();
        predeclare(&mut scope, &blocks, &mut diagnostics).unwrap();
        assert_eq!(scope.custom_block("go %s").unwrap().arguments, vec!["a"]);
        assert!(scope.custom_block_defined_by("da").is_some());
        assert!(scope.custom_block_defined_by("db").is_none());
        assert_eq!(diagnostics.len(), 1);
    }

    #[test]
    fn malformed_prototypes_abort() {
        let mut broken = prototype("pa", "go %s", "[\"a\"]", "[]");
        let blocks = map(vec![definition("da", "pa"), broken.clone()]);
        let err = resolve_prototype(&blocks, &blocks["da"]).unwrap_err();
        assert!(err.to_string().contains("argument"));

        broken.mutation = None;
        let blocks = map(vec![definition("da", "pa"), broken]);
        assert!(resolve_prototype(&blocks, &blocks["da"]).is_err());

        let orphan = definition("da", "nowhere");
        let mut without_input = orphan.clone();
        without_input.inputs.clear();
        let blocks = map(vec![without_input]);
        let err = resolve_prototype(&blocks, &blocks["da"]).unwrap_err();
        assert!(err.to_string().contains("custom_block"));
    }
}
