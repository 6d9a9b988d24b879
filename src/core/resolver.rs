// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright (C) 2026 Erik van der Tier

//! Second-pass label resolver.
//!
//! Walks the encoded record stream and substitutes every placeholder with
//! the label's absolute instruction address. An undefined label fails only
//! its own substitution; the rest of the stream still resolves.

use std::collections::HashMap;

use crate::core::encoder::{Record, SlotValue, EMPTY};
use crate::core::error::{AsmError, AsmErrorKind};

/// A linkage failure attributed to the record's originating source line.
#[derive(Debug)]
pub struct LinkageError {
    pub line: u32,
    pub error: AsmError,
}

/// Resolve all placeholders against the label table.
///
/// Returns the final 4-word records plus any linkage errors. Unresolvable
/// slots are left as `EMPTY`; callers must not emit output when errors are
/// present.
pub fn resolve(records: &[Record], labels: &HashMap<String, u16>) -> (Vec<[u16; 4]>, Vec<LinkageError>) {
    let mut words = Vec::with_capacity(records.len());
    let mut errors = Vec::new();

    for record in records {
        let mut out = [record.control, EMPTY, EMPTY, EMPTY];
        for (idx, slot) in record.operands.iter().enumerate() {
            out[idx + 1] = match slot {
                SlotValue::Empty => EMPTY,
                SlotValue::Value(value) => *value,
                SlotValue::Label(name) => match labels.get(name) {
                    Some(addr) => *addr,
                    None => {
                        errors.push(LinkageError {
                            line: record.line,
                            error: AsmError::new(
                                AsmErrorKind::Linkage,
                                "Label referenced but never defined",
                                Some(name),
                            ),
                        });
                        EMPTY
                    }
                },
            };
        }
        words.push(out);
    }

    (words, errors)
}
