//! Writes allocated registers back into source text.
//!
//! Insertions are collected per line and applied from the last line to the
//! first, so every recorded line number stays valid until it is used.
use std::collections::BTreeMap;

use anyhow::{anyhow, Result};
use tracing::trace;

use super::{Allocation, Binding};
use crate::compiler::model::Category;

/// Inserts each binding's annotation before the `;` ending its declaration
/// and, in the table model, its attribute on its own line above it. The `;`
/// is the first one after the declaration's name, so other statements on the
/// line are left alone. A constant buffer is annotated before its `{`, or at
/// the end of its line. A `register(..)` clause already in the source is
/// replaced by the allocated one.
pub fn apply(source: &str, allocation: &Allocation) -> Result<String> {
    let mut lines = source.split_inclusive('\n').map(str::to_owned).collect::<Vec<_>>();

    let mut by_line = BTreeMap::<u32, Vec<&Binding>>::new();
    for binding in &allocation.bindings {
        by_line.entry(binding.line).or_default().push(binding);
    }

    for (&line, bindings) in by_line.iter_mut().rev() {
        bindings.sort_by_key(|x| x.order);
        let index = (line as usize)
            .checked_sub(1)
            .filter(|&i| i < lines.len())
            .ok_or_else(|| {
                anyhow!(
                    "declaration line {} is outside the source ({} lines)",
                    line,
                    lines.len()
                )
            })?;
        let text = &lines[index];
        let (body, newline) = match text.strip_suffix('\n') {
            Some(body) => (body, "\n"),
            None => (text.as_str(), ""),
        };

        // Replaced byte ranges, empty for plain insertions.
        let mut edits = Vec::with_capacity(bindings.len());
        let mut cursor = 0;
        for binding in bindings.iter() {
            let from = find_word(body, &binding.name, cursor)
                .map_or(cursor, |at| at + binding.name.len());
            let range = if binding.explicit {
                existing_register(body, from).ok_or_else(|| {
                    anyhow!(
                        "register clause of `{}` is not on line {}",
                        binding.name,
                        line
                    )
                })?
            } else if binding.category == Category::Constants {
                let at = match body[from..].find('{') {
                    Some(i) => body[..from + i].trim_end().len(),
                    None => body.len(),
                };
                (at, at)
            } else {
                let at = body[from..].find(';').map(|i| from + i).ok_or_else(|| {
                    anyhow!(
                        "no `;` for declaration `{}` on line {}",
                        binding.name,
                        line
                    )
                })?;
                (at, at)
            };
            cursor = range.1;
            edits.push((range, binding.annotation()));
        }
        // Right to left so earlier offsets stay put.
        edits.sort_by(|a, b| b.0.cmp(&a.0));
        let mut body = body.to_owned();
        for ((start, end), annotation) in edits {
            body.replace_range(start..end, &annotation);
        }
        trace!(line, count = bindings.len(), "spliced register annotations");

        let mut replaced = String::new();
        for attribute in bindings.iter().filter_map(|x| x.attribute()) {
            let indent = body.len() - body.trim_start().len();
            replaced.push_str(&body[..indent]);
            replaced.push_str(&attribute);
            replaced.push('\n');
        }
        replaced.push_str(&body);
        replaced.push_str(newline);
        lines[index] = replaced;
    }
    Ok(lines.concat())
}

fn is_ident_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_'
}

/// Byte offset of `word` at or after `from`, not part of a longer identifier.
fn find_word(body: &str, word: &str, from: usize) -> Option<usize> {
    if word.is_empty() {
        return None;
    }
    body[from..]
        .match_indices(word)
        .map(|(i, _)| from + i)
        .find(|&at| {
            let before = body[..at].chars().next_back();
            let after = body[at + word.len()..].chars().next();
            !before.map_or(false, is_ident_char) && !after.map_or(false, is_ident_char)
        })
}

// ` : register(t5, space1)` after `from`, including the space before the
// colon.
fn existing_register(body: &str, from: usize) -> Option<(usize, usize)> {
    let keyword = find_word(body, "register", from)?;
    let colon = from + body[from..keyword].rfind(':')?;
    let close = keyword + body[keyword..].find(')')?;
    Some((body[..colon].trim_end().len(), close + 1))
}
