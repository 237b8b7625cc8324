//! SQL template loading and named substitution.
//!
//! Templates use `$name` / `${name}` placeholders and `$$` for a literal
//! dollar sign. A `$` that does not start a valid placeholder (for example the
//! positional parameter `$1`) is copied through unchanged.
//!
//! Materialization happens before the execution engine is involved, so a
//! missing value never causes any database traffic.
//!
//! Template files are UTF-8 unless another [`Encoding`] is given.

use crate::error::{SqlError, SqlResult};
use crate::models::{Statement, StatementSource};
use encoding_rs::{Encoding, UTF_8};
use std::collections::HashMap;
use std::path::Path;
use tracing::debug;

/// Resolve a statement source and its substitutions into an executable statement.
pub async fn materialize(
    source: &StatementSource,
    substitutions: &HashMap<String, String>,
) -> SqlResult<Statement> {
    materialize_with_encoding(source, substitutions, UTF_8).await
}

/// Like [`materialize`], reading template files in `encoding`.
pub async fn materialize_with_encoding(
    source: &StatementSource,
    substitutions: &HashMap<String, String>,
    encoding: &'static Encoding,
) -> SqlResult<Statement> {
    let template = match source {
        StatementSource::Inline(sql) => sql.clone(),
        StatementSource::File(path) => load_template(path, encoding).await?,
    };
    substitute(&template, substitutions).map(Statement::new)
}

/// Read a template file and decode it. A leading byte order mark is dropped;
/// bytes that are not valid in `encoding` are an error, never replaced.
pub async fn load_template(path: &Path, encoding: &'static Encoding) -> SqlResult<String> {
    let bytes = tokio::fs::read(path)
        .await
        .map_err(|e| SqlError::template(path.display().to_string(), e.to_string()))?;

    let (text, malformed) = encoding.decode_with_bom_removal(&bytes);
    if malformed {
        return Err(SqlError::template(
            path.display().to_string(),
            format!("file is not valid {} text", encoding.name()),
        ));
    }
    debug!(
        path = %path.display(),
        encoding = encoding.name(),
        bytes = bytes.len(),
        "Loaded SQL template"
    );
    Ok(text.into_owned())
}

/// Look up an encoding by its WHATWG label (`utf-8`, `cp1251`, `latin1`, ...).
pub fn encoding_for_label(label: &str) -> SqlResult<&'static Encoding> {
    Encoding::for_label(label.trim().as_bytes())
        .ok_or_else(|| SqlError::invalid_input(format!("Unknown template encoding '{label}'")))
}

/// Replace every placeholder in `template` with its value.
///
/// Fails with [`SqlError::Substitution`] on the first placeholder that has no
/// value. Unused substitutions are ignored.
pub fn substitute(template: &str, substitutions: &HashMap<String, String>) -> SqlResult<String> {
    let mut out = String::with_capacity(template.len());
    for token in tokenize(template) {
        match token {
            Token::Text(text) => out.push_str(text),
            Token::Placeholder(name) => {
                let value = substitutions
                    .get(name)
                    .ok_or_else(|| SqlError::substitution(name))?;
                out.push_str(value);
            }
        }
    }
    Ok(out)
}

#[derive(Debug, PartialEq, Eq)]
enum Token<'a> {
    Text(&'a str),
    Placeholder(&'a str),
}

fn tokenize(template: &str) -> Vec<Token<'_>> {
    let bytes = template.as_bytes();
    let mut tokens = Vec::new();
    let mut literal_start = 0;
    let mut i = 0;

    while i < bytes.len() {
        if bytes[i] != b'$' {
            i += 1;
            continue;
        }

        let (token, consumed) = match bytes.get(i + 1) {
            Some(b'$') => (Some(Token::Text("$")), 2),
            Some(b'{') => match identifier_len(&bytes[i + 2..]) {
                n if n > 0 && bytes.get(i + 2 + n) == Some(&b'}') => {
                    (Some(Token::Placeholder(&template[i + 2..i + 2 + n])), n + 3)
                }
                _ => (None, 1),
            },
            Some(_) => match identifier_len(&bytes[i + 1..]) {
                0 => (None, 1),
                n => (Some(Token::Placeholder(&template[i + 1..i + 1 + n])), n + 1),
            },
            None => (None, 1),
        };

        match token {
            Some(token) => {
                if literal_start < i {
                    tokens.push(Token::Text(&template[literal_start..i]));
                }
                tokens.push(token);
                i += consumed;
                literal_start = i;
            }
            None => i += consumed,
        }
    }

    if literal_start < bytes.len() {
        tokens.push(Token::Text(&template[literal_start..]));
    }
    tokens
}

/// Length of the ASCII identifier (`[A-Za-z_][A-Za-z0-9_]*`) at the start of `bytes`.
fn identifier_len(bytes: &[u8]) -> usize {
    match bytes.first() {
        Some(b) if b.is_ascii_alphabetic() || *b == b'_' => bytes
            .iter()
            .take_while(|b| b.is_ascii_alphanumeric() || **b == b'_')
            .count(),
        _ => 0,
    }
}
