// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright (C) 2026 Erik van der Tier

//! Source text normalizer.
//!
//! Strips `;` comments and blank lines and lowercases the remaining tokens,
//! keeping the original one-based line number attached to every surviving
//! line so later stages can report against the author's source.

/// One normalized source line with its original line number.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceLine {
    pub line: u32,
    pub text: String,
}

impl SourceLine {
    pub fn new(line: u32, text: impl Into<String>) -> Self {
        Self {
            line,
            text: text.into(),
        }
    }

    /// Whitespace-separated tokens of the line.
    pub fn tokens(&self) -> Vec<&str> {
        self.text.split_whitespace().collect()
    }
}

/// Normalize raw source lines into the form the macro expander consumes.
pub fn normalize(lines: &[String]) -> Vec<SourceLine> {
    let mut out = Vec::new();
    for (idx, raw) in lines.iter().enumerate() {
        let code = raw.split(';').next().unwrap_or("").trim();
        if code.is_empty() {
            continue;
        }
        out.push(SourceLine::new(
            idx as u32 + 1,
            code.to_ascii_lowercase(),
        ));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lines(src: &[&str]) -> Vec<String> {
        src.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn strips_comments_and_blank_lines() {
        let out = normalize(&lines(&[
            "; full line comment",
            "",
            "MOV 1 R0 ; trailing comment",
            "   ",
            "nop",
        ]));
        assert_eq!(out.len(), 2);
        assert_eq!(out[0].text, "mov 1 r0");
        assert_eq!(out[1].text, "nop");
    }

    #[test]
    fn keeps_original_line_numbers() {
        let out = normalize(&lines(&["; header", "add r0 1 r1", "", "label done"]));
        assert_eq!(out[0].line, 2);
        assert_eq!(out[1].line, 4);
    }

    #[test]
    fn lowercases_tokens() {
        let out = normalize(&lines(&["PUSH BP"]));
        assert_eq!(out[0].text, "push bp");
        assert_eq!(out[0].tokens(), vec!["push", "bp"]);
    }
}
