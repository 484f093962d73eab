//! Hardware expectation annotations.
//!
//! A source file paired with a module may carry `;;`-prefixed lines of
//! the form `;;name value`. Each becomes a named assertion handed to the
//! hardware simulation as a `+name=value` plusarg.

use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ExpectError {
    #[error("malformed expectation on line {line}: expected `;;name value`")]
    Malformed { line: usize },
}

/// Collect `(name, expected value)` pairs from annotated source text,
/// in order of appearance.
pub fn parse(source: &str) -> Result<Vec<(String, String)>, ExpectError> {
    let mut expects = Vec::new();
    for (idx, raw) in source.lines().enumerate() {
        let Some(rest) = raw.strip_prefix(";;") else {
            continue;
        };
        let mut tokens = rest.split_whitespace();
        match (tokens.next(), tokens.next(), tokens.next()) {
            (Some(name), Some(value), None) => {
                expects.push((name.to_string(), value.to_string()));
            }
            _ => return Err(ExpectError::Malformed { line: idx + 1 }),
        }
    }
    Ok(expects)
}

/// Format expectations as testbench plusargs.
pub fn plusargs(expects: &[(String, String)]) -> Vec<String> {
    expects
        .iter()
        .map(|(name, value)| format!("+{name}={value}"))
        .collect()
}
