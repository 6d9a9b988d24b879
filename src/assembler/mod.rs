// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright (C) 2026 Erik van der Tier

//! Macro-assembler - main entry point.
//!
//! Ties together the core engines (normalizer, macro expander, instruction
//! encoder, label resolver) behind the CLI-driven run flow and the
//! `assemble_lines` library entry.

pub mod cli;
mod engine;
mod output;
mod passes;
#[cfg(test)]
mod tests;

use engine::Assembler;
use output::{emit_expanded_file, emit_labels_file, emit_stream_file};

use std::collections::HashMap;
use std::fs;
use std::path::Path;
use std::sync::Arc;

use clap::Parser;

use crate::core::encoder::{Encoder, Record};
use crate::core::error::{
    AsmError, AsmErrorKind, AsmRunError, AsmRunReport, Diagnostic, PassCounts, Severity,
};
use crate::core::expander::Expander;
use crate::core::normalize::{SourceLine, normalize};
use crate::core::resolver::resolve;

pub use cli::{
    Cli, CliConfig, DiagnosticsSinkConfig, OutputFormat, VERSION, WarningPolicy,
    input_base_from_path, resolve_output_path, validate_cli,
};
pub use passes::{assemble_lines, run, run_with_cli};

/// Everything a successful assembly run produces, before any file IO.
#[derive(Debug)]
pub struct AssemblyOutput {
    /// Resolved 4-word records in emission order.
    pub words: Vec<[u16; 4]>,
    /// Label name to instruction address.
    pub labels: HashMap<String, u16>,
    /// Macro-expanded primitive lines with their originating line numbers.
    pub expanded: Vec<SourceLine>,
    /// Warnings surviving a successful run.
    pub diagnostics: Vec<Diagnostic>,
    pub source_lines: Arc<Vec<String>>,
}
