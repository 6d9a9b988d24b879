// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright (C) 2026 Erik van der Tier

//! Instruction encoder for the 16-bit target machine.
//!
//! Each primitive line becomes one 4-word record `[control, op1, op2, op3]`
//! or a label binding. The opcode taxonomy is a closed three-level table
//! (category, subtype, function); a mnemonic resolves to exactly one triple
//! and carries its operand layout, so dispatch is a single table lookup.

use std::collections::HashMap;

use crate::core::error::{AsmError, AsmErrorKind};
use crate::core::normalize::SourceLine;

/// Sentinel stored in unused operand slots.
pub const EMPTY: u16 = 0xFFFF;

const IMM1_BIT: u16 = 15;
const IMM2_BIT: u16 = 14;
const OPCODE_SHIFT: u16 = 9;
const SUBTYPE_SHIFT: u16 = 6;
const SUBFUNC_SHIFT: u16 = 2;

const CAT_NOP: u16 = 0b0000;
const CAT_CALC: u16 = 0b0001;
const CAT_COND: u16 = 0b0010;
const CAT_COPY: u16 = 0b0011;

const SUB_BASE: u16 = 0b000;
const SUB_MATH: u16 = 0b001;
const SUB_NORMAL: u16 = 0b000;
const SUB_STACK: u16 = 0b001;

/// What a token is allowed to resolve to in a given operand position.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperandKind {
    /// Literal or register.
    Src,
    /// Register only.
    Dst,
    /// Literal or label.
    Goto,
    /// Literal, register, or label.
    Jmp,
}

impl OperandKind {
    fn allows_number(self) -> bool {
        !matches!(self, OperandKind::Dst)
    }

    fn allows_register(self) -> bool {
        matches!(self, OperandKind::Src | OperandKind::Dst | OperandKind::Jmp)
    }

    fn allows_label(self) -> bool {
        matches!(self, OperandKind::Goto | OperandKind::Jmp)
    }

    fn name(self) -> &'static str {
        match self {
            OperandKind::Src => "src",
            OperandKind::Dst => "dst",
            OperandKind::Goto => "goto",
            OperandKind::Jmp => "jmp",
        }
    }
}

/// Which of the three operand words a parsed token lands in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum OperandSlot {
    Op1,
    Op2,
    Op3,
}

/// One mnemonic in the closed opcode hierarchy.
#[derive(Debug)]
pub struct OpcodeEntry {
    pub name: &'static str,
    pub category: u16,
    pub subtype: u16,
    pub func: u16,
    operands: &'static [(OperandSlot, OperandKind)],
}

use OperandKind::{Dst, Goto, Jmp, Src};
use OperandSlot::{Op1, Op2, Op3};

const NO_OPERANDS: &[(OperandSlot, OperandKind)] = &[];
const MOVE: &[(OperandSlot, OperandKind)] = &[(Op1, Jmp), (Op3, Dst)];
const PUSH: &[(OperandSlot, OperandKind)] = &[(Op1, Src)];
const POP: &[(OperandSlot, OperandKind)] = &[(Op3, Dst)];
const CALC1: &[(OperandSlot, OperandKind)] = &[(Op1, Src), (Op3, Dst)];
const CALC2: &[(OperandSlot, OperandKind)] = &[(Op1, Src), (Op2, Src), (Op3, Dst)];
const COMPARE: &[(OperandSlot, OperandKind)] = &[(Op1, Src), (Op2, Src), (Op3, Goto)];

macro_rules! op {
    ($name:literal, $cat:expr, $sub:expr, $func:literal, $operands:expr) => {
        OpcodeEntry {
            name: $name,
            category: $cat,
            subtype: $sub,
            func: $func,
            operands: $operands,
        }
    };
}

/// The full mnemonic table. Bit-exact with the consuming virtual machine.
pub static OPCODES: &[OpcodeEntry] = &[
    op!("nop", CAT_NOP, SUB_BASE, 0b0000, NO_OPERANDS),
    // calc/base: bitwise and shifts
    op!("not", CAT_CALC, SUB_BASE, 0b0000, CALC1),
    op!("and", CAT_CALC, SUB_BASE, 0b0001, CALC2),
    op!("or", CAT_CALC, SUB_BASE, 0b0010, CALC2),
    op!("nand", CAT_CALC, SUB_BASE, 0b0011, CALC2),
    op!("nor", CAT_CALC, SUB_BASE, 0b0100, CALC2),
    op!("xor", CAT_CALC, SUB_BASE, 0b0101, CALC2),
    op!("xnor", CAT_CALC, SUB_BASE, 0b0110, CALC2),
    op!("shl", CAT_CALC, SUB_BASE, 0b1000, CALC2),
    op!("shr", CAT_CALC, SUB_BASE, 0b1001, CALC2),
    op!("rol", CAT_CALC, SUB_BASE, 0b1010, CALC2),
    op!("ror", CAT_CALC, SUB_BASE, 0b1011, CALC2),
    op!("ashr", CAT_CALC, SUB_BASE, 0b1100, CALC2),
    // calc/math: arithmetic
    op!("neg", CAT_CALC, SUB_MATH, 0b0000, CALC1),
    op!("add", CAT_CALC, SUB_MATH, 0b0001, CALC2),
    op!("sub", CAT_CALC, SUB_MATH, 0b0010, CALC2),
    op!("mul", CAT_CALC, SUB_MATH, 0b0011, CALC2),
    op!("div", CAT_CALC, SUB_MATH, 0b0100, CALC2),
    op!("mod", CAT_CALC, SUB_MATH, 0b0101, CALC2),
    // cond/base: comparisons, trailing s marks the signed variants
    op!("eq", CAT_COND, SUB_BASE, 0b0000, COMPARE),
    op!("lt", CAT_COND, SUB_BASE, 0b0001, COMPARE),
    op!("lte", CAT_COND, SUB_BASE, 0b0010, COMPARE),
    op!("gt", CAT_COND, SUB_BASE, 0b0011, COMPARE),
    op!("gte", CAT_COND, SUB_BASE, 0b0100, COMPARE),
    op!("lts", CAT_COND, SUB_BASE, 0b1000, COMPARE),
    op!("ltes", CAT_COND, SUB_BASE, 0b1001, COMPARE),
    op!("gts", CAT_COND, SUB_BASE, 0b1010, COMPARE),
    op!("gtes", CAT_COND, SUB_BASE, 0b1011, COMPARE),
    // copy
    op!("mov", CAT_COPY, SUB_NORMAL, 0b0000, MOVE),
    op!("push", CAT_COPY, SUB_STACK, 0b0000, PUSH),
    op!("pop", CAT_COPY, SUB_STACK, 0b0001, POP),
];

/// Fixed register name table. `pc-` and `pc+` are read-only by convention.
pub static REGISTERS: &[(&str, u16)] = &[
    ("r0", 0),
    ("r1", 1),
    ("r2", 2),
    ("r3", 3),
    ("r4", 4),
    ("r5", 5),
    ("rv", 6),
    ("bp", 7),
    ("sp", 8),
    ("pc", 9),
    ("pc-", 10),
    ("pc+", 11),
];

pub const REG_RV: u16 = 6;
pub const REG_BP: u16 = 7;
pub const REG_SP: u16 = 8;
pub const REG_PC: u16 = 9;
pub const REG_PC_PREV: u16 = 10;
pub const REG_PC_NEXT: u16 = 11;

pub fn lookup_mnemonic(name: &str) -> Option<&'static OpcodeEntry> {
    OPCODES.iter().find(|entry| entry.name == name)
}

pub fn register_index(name: &str) -> Option<u16> {
    REGISTERS
        .iter()
        .find(|(reg, _)| *reg == name)
        .map(|&(_, idx)| idx)
}

pub fn is_register(tok: &str) -> bool {
    register_index(tok).is_some()
}

pub fn is_condition(name: &str) -> bool {
    lookup_mnemonic(name).is_some_and(|entry| entry.category == CAT_COND)
}

/// Parse an integer literal with the conventional `0x`/`0b`/`0o` prefixes.
pub fn parse_int(tok: &str) -> Option<i64> {
    let (negative, body) = match tok.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, tok),
    };
    if body.is_empty() {
        return None;
    }
    let value = if let Some(hex) = body.strip_prefix("0x") {
        i64::from_str_radix(hex, 16).ok()?
    } else if let Some(bin) = body.strip_prefix("0b") {
        i64::from_str_radix(bin, 2).ok()?
    } else if let Some(oct) = body.strip_prefix("0o") {
        i64::from_str_radix(oct, 8).ok()?
    } else {
        body.parse::<i64>().ok()?
    };
    Some(if negative { -value } else { value })
}

/// Wrap an integer into the machine's 16-bit unsigned operand space.
pub fn to_u16(value: i64) -> u16 {
    (value & 0xFFFF) as u16
}

pub fn is_int(tok: &str) -> bool {
    parse_int(tok).is_some()
}

pub fn is_int_or_register(tok: &str) -> bool {
    is_int(tok) || is_register(tok)
}

fn control_word(entry: &OpcodeEntry, imm1: bool, imm2: bool) -> u16 {
    let mut word = 0u16;
    word |= (imm1 as u16) << IMM1_BIT;
    word |= (imm2 as u16) << IMM2_BIT;
    word |= entry.category << OPCODE_SHIFT;
    word |= entry.subtype << SUBTYPE_SHIFT;
    word |= entry.func << SUBFUNC_SHIFT;
    word
}

/// Split a control word back into its fields.
pub fn decode_control(word: u16) -> (u16, u16, u16, bool, bool) {
    let opcode = (word >> OPCODE_SHIFT) & 0b1111;
    let subtype = (word >> SUBTYPE_SHIFT) & 0b111;
    let subfunc = (word >> SUBFUNC_SHIFT) & 0b1111;
    let imm1 = word & (1 << IMM1_BIT) != 0;
    let imm2 = word & (1 << IMM2_BIT) != 0;
    (opcode, subtype, subfunc, imm1, imm2)
}

/// Recover the mnemonic for a decoded `(category, subtype, function)` triple.
pub fn mnemonic_for(category: u16, subtype: u16, func: u16) -> Option<&'static str> {
    OPCODES
        .iter()
        .find(|entry| {
            entry.category == category && entry.subtype == subtype && entry.func == func
        })
        .map(|entry| entry.name)
}

/// One operand word of a record before resolution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SlotValue {
    Empty,
    Value(u16),
    /// Placeholder carrying a label name for the resolver.
    Label(String),
}

impl SlotValue {
    /// Placeholder spelling used in the expanded listing (`#name`).
    pub fn display(&self) -> String {
        match self {
            SlotValue::Empty => EMPTY.to_string(),
            SlotValue::Value(value) => value.to_string(),
            SlotValue::Label(name) => format!("#{name}"),
        }
    }
}

/// One encoded instruction record, possibly with unresolved placeholders.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Record {
    /// Originating source line, for diagnostics.
    pub line: u32,
    pub control: u16,
    pub operands: [SlotValue; 3],
}

pub struct Encoder {
    labels: HashMap<String, u16>,
    emitted: u32,
    warnings: Vec<AsmError>,
}

impl Default for Encoder {
    fn default() -> Self {
        Self::new()
    }
}

impl Encoder {
    pub fn new() -> Self {
        Self {
            labels: HashMap::new(),
            emitted: 0,
            warnings: Vec::new(),
        }
    }

    pub fn labels(&self) -> &HashMap<String, u16> {
        &self.labels
    }

    pub fn into_labels(self) -> HashMap<String, u16> {
        self.labels
    }

    /// Warnings accumulated since the last drain (read-only `pc` views used
    /// as a destination).
    pub fn take_warnings(&mut self) -> Vec<AsmError> {
        std::mem::take(&mut self.warnings)
    }

    /// Encode one primitive line.
    ///
    /// Returns `Ok(Some(record))` for an instruction, `Ok(None)` for a
    /// `label` pseudo-op (consumed into the label table).
    pub fn encode_line(&mut self, line: &SourceLine) -> Result<Option<Record>, AsmError> {
        let tokens = line.tokens();
        let Some(&mnemonic) = tokens.first() else {
            return Ok(None);
        };

        if mnemonic == "label" {
            self.check_arity("label", 1, tokens.len() - 1)?;
            self.define_label(tokens[1])?;
            return Ok(None);
        }

        let entry = lookup_mnemonic(mnemonic)
            .ok_or_else(|| AsmError::new(AsmErrorKind::Mnemonic, "Unknown mnemonic", Some(mnemonic)))?;
        self.check_arity(mnemonic, entry.operands.len(), tokens.len() - 1)?;

        let mut operands = [SlotValue::Empty, SlotValue::Empty, SlotValue::Empty];
        let mut imm1 = false;
        let mut imm2 = false;
        for (tok, &(slot, kind)) in tokens[1..].iter().zip(entry.operands) {
            let (value, is_imm) = self.parse_operand(tok, kind)?;
            match slot {
                OperandSlot::Op1 => {
                    imm1 = is_imm;
                    operands[0] = value;
                }
                OperandSlot::Op2 => {
                    imm2 = is_imm;
                    operands[1] = value;
                }
                OperandSlot::Op3 => operands[2] = value,
            }
        }

        self.emitted += 1;
        Ok(Some(Record {
            line: line.line,
            control: control_word(entry, imm1, imm2),
            operands,
        }))
    }

    fn define_label(&mut self, name: &str) -> Result<(), AsmError> {
        if self.labels.contains_key(name) {
            // First definition wins.
            return Err(AsmError::new(
                AsmErrorKind::Label,
                "Label defined more than once",
                Some(name),
            ));
        }
        if self.emitted > u16::MAX as u32 {
            return Err(AsmError::new(
                AsmErrorKind::Label,
                "Label address exceeds the 16-bit address space",
                Some(name),
            ));
        }
        self.labels.insert(name.to_string(), self.emitted as u16);
        Ok(())
    }

    fn check_arity(&self, mnemonic: &str, expected: usize, actual: usize) -> Result<(), AsmError> {
        if expected != actual {
            let message = format!("{mnemonic} expects {expected} operands, got {actual}");
            return Err(AsmError::new(AsmErrorKind::Arity, &message, None));
        }
        Ok(())
    }

    /// Parse one operand token. Literal first, then register, then label
    /// where the kind permits. Returns the slot value and whether the
    /// operand is an immediate.
    fn parse_operand(&mut self, tok: &str, kind: OperandKind) -> Result<(SlotValue, bool), AsmError> {
        if kind.allows_number() {
            if let Some(value) = parse_int(tok) {
                return Ok((SlotValue::Value(to_u16(value)), true));
            }
        }
        if kind.allows_register() {
            if let Some(idx) = register_index(tok) {
                if kind == OperandKind::Dst && (idx == REG_PC_PREV || idx == REG_PC_NEXT) {
                    self.warnings.push(AsmError::new(
                        AsmErrorKind::Lexical,
                        "Register is read-only by convention and should not be a destination",
                        Some(tok),
                    ));
                }
                return Ok((SlotValue::Value(idx), false));
            }
        }
        // A register name never resolves as a label placeholder.
        if kind.allows_label() && !is_register(tok) {
            return Ok((SlotValue::Label(tok.to_string()), true));
        }
        let message = format!("Operand not valid as {}", kind.name());
        Err(AsmError::new(AsmErrorKind::Lexical, &message, Some(tok)))
    }
}
