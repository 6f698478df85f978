//! Template compilation with `{{variable}}` substitution
//!
//! A marker is `{{identifier}}` where the identifier is a non-empty run of
//! characters containing neither `{` nor `}`. Nothing inside the braces is
//! trimmed, so `{{ name }}` refers to the variable `" name "`.
//!
//! Compilation scans left to right: bound markers are replaced with their
//! value verbatim and unbound markers become `[identifier]`. A marker that
//! only appears once a value is joined with the braces around it is sealed
//! into `[identifier]` as well, while markers lying wholly inside one bound
//! value are left as inserted. An unterminated `{{` is copied through as
//! literal text.

use std::collections::HashSet;
use std::iter;

use serde_json::Value;
use tracing::debug;

use crate::templates::types::{Bindings, Block, CompiledTemplate, EmailTemplate};

/// A piece of a scanned pattern
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Segment<'a> {
    Text(&'a str),
    Marker(&'a str),
}

/// Compiles templates and discovers the variables they reference
pub struct TemplateCompiler;

impl TemplateCompiler {
    /// Substitute every marker in `pattern`.
    ///
    /// Missing bindings are not an error: the marker becomes `[name]`.
    pub fn compile(pattern: &str, bindings: &Bindings) -> String {
        let mut output = String::with_capacity(pattern.len());
        let mut origins = Vec::with_capacity(pattern.len());
        let mut next_value = 0;

        for segment in segments(pattern) {
            match segment {
                Segment::Text(text) => push_literal(&mut output, &mut origins, text),
                Segment::Marker(name) => match bindings.get(name) {
                    Some(value) => {
                        next_value += 1;
                        output.push_str(value);
                        origins.extend(iter::repeat(next_value).take(value.len()));
                    }
                    None => push_placeholder(&mut output, &mut origins, name),
                },
            }
        }

        seal_markers(output, origins)
    }

    /// Compile subject and HTML with `bindings` layered over the template's
    /// default values.
    pub fn compile_template(template: &EmailTemplate, bindings: &Bindings) -> CompiledTemplate {
        let mut merged = template.default_values.clone();
        merged.extend(bindings.iter().map(|(k, v)| (k.clone(), v.clone())));

        for (field, pattern) in [("subject", &template.subject), ("html", &template.html)] {
            let offsets = Self::lint_pattern(pattern);
            if !offsets.is_empty() {
                debug!(
                    template = %template.id,
                    field,
                    ?offsets,
                    "Unterminated markers left as literal text"
                );
            }
        }

        CompiledTemplate {
            subject: Self::compile(&template.subject, &merged),
            body: Self::compile(&template.html, &merged),
        }
    }

    /// Distinct marker names across the string fields of `blocks`, in
    /// first-seen order.
    pub fn extract_variables(blocks: &[Block]) -> Vec<String> {
        let mut seen = HashSet::new();
        let mut variables = Vec::new();

        for block in blocks {
            for value in block.content.values() {
                if let Value::String(text) = value {
                    collect_markers(text, &mut seen, &mut variables);
                }
            }
        }

        variables
    }

    /// Distinct marker names in a single pattern, in first-seen order
    pub fn extract_from_text(pattern: &str) -> Vec<String> {
        let mut seen = HashSet::new();
        let mut variables = Vec::new();
        collect_markers(pattern, &mut seen, &mut variables);
        variables
    }

    /// Byte offsets of `{{` sequences that never see a closing `}}`
    pub fn lint_pattern(pattern: &str) -> Vec<usize> {
        let bytes = pattern.as_bytes();
        let mut offsets = Vec::new();
        let mut i = 0;

        while i + 1 < bytes.len() {
            if bytes[i] == b'{' && bytes[i + 1] == b'{' {
                if let Some(len) = marker_len(&bytes[i + 2..]) {
                    i += len + 4;
                    continue;
                }
                let starts_run = i == 0 || bytes[i - 1] != b'{';
                if starts_run && !pattern[i + 2..].contains("}}") {
                    offsets.push(i);
                }
            }
            i += 1;
        }

        offsets
    }
}

fn collect_markers(pattern: &str, seen: &mut HashSet<String>, variables: &mut Vec<String>) {
    for segment in segments(pattern) {
        if let Segment::Marker(name) = segment {
            if seen.insert(name.to_string()) {
                variables.push(name.to_string());
            }
        }
    }
}

/// Byte origin in compiled output: 0 for pattern text and placeholders,
/// otherwise the 1-based index of the bound value the byte came from.
type Origin = u32;

fn push_literal(output: &mut String, origins: &mut Vec<Origin>, text: &str) {
    output.push_str(text);
    origins.extend(iter::repeat(0).take(text.len()));
}

fn push_placeholder(output: &mut String, origins: &mut Vec<Origin>, name: &str) {
    output.push('[');
    output.push_str(name);
    output.push(']');
    origins.extend(iter::repeat(0).take(name.len() + 2));
}

/// Turn markers formed across a bound value and its surroundings into
/// placeholders, until none are left.
///
/// Each round removes four braces, so this terminates.
fn seal_markers(mut output: String, mut origins: Vec<Origin>) -> String {
    loop {
        let bytes = output.as_bytes();
        let mut sealed = String::with_capacity(output.len());
        let mut sealed_origins = Vec::with_capacity(origins.len());
        let mut changed = false;
        let mut literal_start = 0;
        let mut i = 0;

        while i + 1 < bytes.len() {
            if bytes[i] == b'{' && bytes[i + 1] == b'{' {
                if let Some(len) = marker_len(&bytes[i + 2..]) {
                    let end = i + len + 4;
                    let owner = origins[i];
                    if owner != 0 && origins[i..end].iter().all(|&o| o == owner) {
                        i = end;
                        continue;
                    }

                    sealed.push_str(&output[literal_start..i]);
                    sealed_origins.extend_from_slice(&origins[literal_start..i]);
                    push_placeholder(&mut sealed, &mut sealed_origins, &output[i + 2..i + 2 + len]);
                    changed = true;
                    i = end;
                    literal_start = end;
                    continue;
                }
            }
            i += 1;
        }

        if !changed {
            return output;
        }

        sealed.push_str(&output[literal_start..]);
        sealed_origins.extend_from_slice(&origins[literal_start..]);
        output = sealed;
        origins = sealed_origins;
    }
}

/// Length of the identifier at the start of `rest` if it is followed by `}}`
fn marker_len(rest: &[u8]) -> Option<usize> {
    let len = rest.iter().take_while(|&&b| b != b'{' && b != b'}').count();
    if len > 0 && rest.get(len) == Some(&b'}') && rest.get(len + 1) == Some(&b'}') {
        Some(len)
    } else {
        None
    }
}

/// Split a pattern into literal text and markers.
///
/// Braces are ASCII, so every split point is a char boundary.
fn segments(pattern: &str) -> Vec<Segment<'_>> {
    let bytes = pattern.as_bytes();
    let mut segments = Vec::new();
    let mut literal_start = 0;
    let mut i = 0;

    while i + 1 < bytes.len() {
        if bytes[i] == b'{' && bytes[i + 1] == b'{' {
            if let Some(len) = marker_len(&bytes[i + 2..]) {
                if literal_start < i {
                    segments.push(Segment::Text(&pattern[literal_start..i]));
                }
                segments.push(Segment::Marker(&pattern[i + 2..i + 2 + len]));
                i += len + 4;
                literal_start = i;
                continue;
            }
        }
        i += 1;
    }

    if literal_start < bytes.len() {
        segments.push(Segment::Text(&pattern[literal_start..]));
    }

    segments
}
