// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright (C) 2026 Erik van der Tier

//! Emitters for the instruction stream, label table, and expanded listing.

use std::collections::HashMap;
use std::fs;
use std::path::Path;
use std::sync::Arc;

use serde_json::json;

use crate::core::error::{AsmError, AsmErrorKind, AsmRunError};
use crate::core::normalize::SourceLine;

use super::cli;

/// One line per record: four unsigned 16-bit decimal values, space
/// separated, in `[control, op1, op2, op3]` order.
pub(super) fn build_stream_text(words: &[[u16; 4]]) -> String {
    let mut out = String::new();
    for [control, op1, op2, op3] in words {
        out.push_str(&format!("{control} {op1} {op2} {op3}\n"));
    }
    out
}

pub(super) fn build_labels_text(
    labels: &HashMap<String, u16>,
    output_format: cli::OutputFormat,
) -> String {
    let mut entries: Vec<(&String, &u16)> = labels.iter().collect();
    entries.sort_by(|left, right| {
        left.0
            .to_ascii_lowercase()
            .cmp(&right.0.to_ascii_lowercase())
    });

    if output_format == cli::OutputFormat::Json {
        let labels: Vec<serde_json::Value> = entries
            .into_iter()
            .map(|(name, address)| {
                json!({
                    "name": name,
                    "address": address,
                })
            })
            .collect();
        return json!({ "labels": labels }).to_string();
    }

    let mut out = String::new();
    for (name, address) in entries {
        out.push_str(&format!("{name} = {address}\n"));
    }
    out
}

/// The expanded listing is plain primitive lines, one per record or label
/// binding, so it can be fed back through the assembler unchanged.
pub(super) fn build_expanded_text(lines: &[SourceLine]) -> String {
    let mut out = String::new();
    for line in lines {
        out.push_str(&line.text);
        out.push('\n');
    }
    out
}

pub(super) fn emit_stream_file(
    path: &Path,
    words: &[[u16; 4]],
    source_lines: Arc<Vec<String>>,
) -> Result<(), AsmRunError> {
    write_output(path, build_stream_text(words), "instruction stream", source_lines)
}

pub(super) fn emit_labels_file(
    path: &Path,
    labels: &HashMap<String, u16>,
    output_format: cli::OutputFormat,
    source_lines: Arc<Vec<String>>,
) -> Result<(), AsmRunError> {
    write_output(
        path,
        build_labels_text(labels, output_format),
        "labels",
        source_lines,
    )
}

pub(super) fn emit_expanded_file(
    path: &Path,
    lines: &[SourceLine],
    source_lines: Arc<Vec<String>>,
) -> Result<(), AsmRunError> {
    write_output(path, build_expanded_text(lines), "expanded listing", source_lines)
}

fn write_output(
    path: &Path,
    body: String,
    what: &str,
    source_lines: Arc<Vec<String>>,
) -> Result<(), AsmRunError> {
    fs::write(path, body).map_err(|err| {
        AsmRunError::new(
            AsmError::new(
                AsmErrorKind::Io,
                &format!("Error writing {what} file: {err}"),
                Some(path.to_string_lossy().as_ref()),
            ),
            Vec::new(),
            source_lines,
        )
    })
}
