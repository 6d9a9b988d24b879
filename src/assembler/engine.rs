// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright (C) 2026 Erik van der Tier

use super::*;

/// Drives the three passes over one input: expand, encode, resolve.
///
/// Diagnostics accumulate across passes; every pass is record-and-continue
/// so one run reports as many independent problems as possible.
pub(crate) struct Assembler {
    expander: Expander,
    encoder: Encoder,
    expanded: Vec<SourceLine>,
    records: Vec<Record>,
    resolved: Vec<[u16; 4]>,
    diagnostics: Vec<Diagnostic>,
}

impl Assembler {
    pub(crate) fn new() -> Self {
        Self {
            expander: Expander::new(),
            encoder: Encoder::new(),
            expanded: Vec::new(),
            records: Vec::new(),
            resolved: Vec::new(),
            diagnostics: Vec::new(),
        }
    }

    pub(crate) fn take_diagnostics(&mut self) -> Vec<Diagnostic> {
        std::mem::take(&mut self.diagnostics)
    }

    pub(crate) fn expanded_lines(&self) -> &[SourceLine] {
        &self.expanded
    }

    pub(crate) fn labels(&self) -> &HashMap<String, u16> {
        self.encoder.labels()
    }

    pub(crate) fn resolved_words(&self) -> &[[u16; 4]] {
        &self.resolved
    }

    /// Pass 1: lower structured constructs to primitive lines.
    ///
    /// A failing line contributes no output but the expander state it did
    /// not reach stays intact, so subsequent lines keep expanding.
    pub(crate) fn expand_pass(&mut self, lines: &[SourceLine]) -> PassCounts {
        let mut counts = PassCounts::new();
        for line in lines {
            counts.lines += 1;
            match self.expander.expand_line(line) {
                Ok(emitted) => {
                    for text in emitted {
                        self.expanded.push(SourceLine::new(line.line, text));
                    }
                }
                Err(err) => {
                    self.diagnostics
                        .push(Diagnostic::new(line.line, Severity::Error, err));
                    counts.errors += 1;
                }
            }
        }

        let eof_line = lines.last().map(|line| line.line).unwrap_or(0);
        for err in self.expander.finish() {
            self.diagnostics
                .push(Diagnostic::new(eof_line, Severity::Error, err));
            counts.errors += 1;
        }
        counts
    }

    /// Pass 2: encode primitive lines into records and bind labels.
    pub(crate) fn encode_pass(&mut self) -> PassCounts {
        let mut counts = PassCounts::new();
        for line in &self.expanded {
            counts.lines += 1;
            match self.encoder.encode_line(line) {
                Ok(Some(record)) => self.records.push(record),
                Ok(None) => {}
                Err(err) => {
                    self.diagnostics
                        .push(Diagnostic::new(line.line, Severity::Error, err));
                    counts.errors += 1;
                }
            }
            // Drain per line so warnings carry the right line number.
            for warning in self.encoder.take_warnings() {
                self.diagnostics
                    .push(Diagnostic::new(line.line, Severity::Warning, warning));
                counts.warnings += 1;
            }
        }
        counts
    }

    /// Pass 3: substitute label placeholders with resolved addresses.
    pub(crate) fn resolve_pass(&mut self) -> PassCounts {
        let mut counts = PassCounts::new();
        let (words, errors) = resolve(&self.records, self.encoder.labels());
        self.resolved = words;
        for failure in errors {
            self.diagnostics
                .push(Diagnostic::new(failure.line, Severity::Error, failure.error));
            counts.errors += 1;
        }
        counts
    }
}
