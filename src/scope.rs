//! Lexical scope used while emitting one target.

use crate::sanitize::{sanitize, uniquify};
use indexmap::IndexMap;

/// A registered custom procedure, keyed in [`Scope`] by its proccode.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CustomBlock {
    /// The `procedures_definition` block that owns this registration.
    pub definition_id: String,
    pub name: String,
    /// Argument ids in declaration order; call inputs are keyed by these.
    pub arguments: Vec<String>,
    pub argument_names: Vec<String>,
    pub warp: bool,
}

#[derive(Debug, Clone, Default)]
pub struct Scope {
    custom_blocks: IndexMap<String, CustomBlock>,
    vars: IndexMap<String, String>,
    stage: bool,
}

impl Scope {
    pub fn new(stage: bool) -> Self {
        Self {
            stage,
            ..Self::default()
        }
    }

    /// Copy for a procedure body. Declarations made in the fork never reach
    /// `self`.
    pub fn fork(&self) -> Self {
        self.clone()
    }

    pub fn is_stage(&self) -> bool {
        self.stage
    }

    pub fn is_name_taken(&self, name: &str) -> bool {
        self.vars.values().any(|v| v == name) || self.custom_blocks.values().any(|b| b.name == name)
    }

    pub fn variable_name(&self, id: &str) -> Option<&str> {
        self.vars.get(id).map(String::as_str)
    }

    pub fn is_declared(&self, id: &str) -> bool {
        self.vars.contains_key(id)
    }

    /// Binds `id` on first sight and returns the emitted name. Later calls for
    /// the same id return the first name.
    pub fn bind_variable(&mut self, id: &str, raw_name: &str) -> String {
        if let Some(existing) = self.vars.get(id) {
            return existing.clone();
        }
        let name = uniquify(sanitize(raw_name), self);
        self.vars.insert(id.to_string(), name.clone());
        name
    }

    /// Records a binding that was declared elsewhere (stage globals seen from a
    /// sprite).
    pub fn inherit_binding(&mut self, id: &str, name: &str) {
        self.vars.insert(id.to_string(), name.to_string());
    }

    pub fn custom_block(&self, proccode: &str) -> Option<&CustomBlock> {
        self.custom_blocks.get(proccode)
    }

    pub fn register_custom_block(&mut self, proccode: &str, block: CustomBlock) {
        self.custom_blocks.insert(proccode.to_string(), block);
    }

    /// The registration made for `definition_id`, if that definition won its
    /// proccode.
    pub fn custom_block_defined_by(&self, definition_id: &str) -> Option<&CustomBlock> {
        self.custom_blocks
            .values()
            .find(|b| b.definition_id == definition_id)
    }

    pub fn bindings(&self) -> impl Iterator<Item = (&str, &str)> {
        self.vars.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_binding_wins() {
        let mut scope = Scope::new(false);
        assert_eq!(scope.bind_variable("id", "score"), "score");
        assert_eq!(scope.bind_variable("id", "renamed"), "score");
        assert_eq!(scope.variable_name("id"), Some("score"));
    }

    #[test]
    fn forks_do_not_leak_into_parent() {
        let mut parent = Scope::new(true);
        parent.bind_variable("g", "global");
        let mut child = parent.fork();
        child.bind_variable("l", "local");
        assert!(child.is_declared("g"));
        assert!(child.is_stage());
        assert!(!parent.is_declared("l"));
    }

    #[test]
    fn procedure_names_block_variable_names() {
        let mut scope = Scope::new(false);
        scope.register_custom_block(
            "jump %s",
            CustomBlock {
                definition_id: "def".into(),
                name: "jump".into(),
                arguments: vec!["a".into()],
                argument_names: vec!["h".into()],
                warp: false,
            },
        );
        assert_eq!(scope.bind_variable("v", "jump"), "jump_");
        assert_eq!(scope.custom_block_defined_by("def").unwrap().name, "jump");
        assert!(scope.custom_block_defined_by("other").is_none());
    }
}
