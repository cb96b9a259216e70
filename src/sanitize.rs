use crate::scope::Scope;

/// Words of the emitted language that can never be used as identifiers.
pub const RESERVED_WORDS: &[&str] = &[
    "var", "global", "list", "fn", "warp", "return", "if", "else", "while", "for", "repeat",
    "forever", "true", "false", "include", "and", "or", "not",
];

/// Turns an arbitrary human-entered name into a bare identifier.
pub fn sanitize(raw: &str) -> String {
    let mut out = raw
        .chars()
        .map(|c| if c.is_alphanumeric() || c == '_' { c } else { '_' })
        .collect::<String>();
    if out.is_empty() {
        return "_".to_string();
    }
    if out.starts_with(|c: char| c.is_ascii_digit()) {
        out.insert(0, '_');
    }
    out
}

pub fn is_reserved(name: &str) -> bool {
    RESERVED_WORDS.contains(&name)
}

/// Name of a procedure parameter. Depends only on the raw name, so a
/// procedure header and the argument reporters in its body agree.
pub fn parameter_name(raw: &str) -> String {
    uniquify_with(sanitize(raw), is_reserved)
}

/// Appends `_` until `candidate` is neither reserved nor already visible in
/// `scope`.
pub fn uniquify(candidate: String, scope: &Scope) -> String {
    uniquify_with(candidate, |name| is_reserved(name) || scope.is_name_taken(name))
}

pub fn uniquify_with<F>(mut candidate: String, taken: F) -> String
where
    F: Fn(&str) -> bool,
{
    while taken(&candidate) {
        candidate.push('_');
    }
    candidate
}

pub fn quote_str(s: &str) -> String {
    format!("\"{}\"", s.replace('\\', "\\\\").replace('"', "\\\""))
}
