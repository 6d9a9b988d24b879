// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright (C) 2026 Erik van der Tier

//! Macro expander lowering structured control flow to primitive lines.
//!
//! Consumes one normalized line at a time and emits zero or more primitive
//! lines (label pseudo-ops, moves, arithmetic, conditional jumps). Open
//! `if`/`while`/`for` constructs live on a nesting stack; at most one
//! function body is open at a time. Synthetic labels are drawn from one
//! monotonically increasing counter per run, so nested and sequential
//! constructs can never collide.

use crate::core::encoder::{is_condition, is_int_or_register, is_register, parse_int};
use crate::core::error::{AsmError, AsmErrorKind};
use crate::core::normalize::SourceLine;

/// Registers a function prologue may save (and `ret` restores).
pub const CALLEE_SAVED: &[&str] = &["r3", "r4", "r5"];
/// Registers a call site may save around the call.
pub const CALLER_SAVED: &[&str] = &["r0", "r1", "r2"];

/// One open structured construct.
#[derive(Debug)]
enum Frame {
    If {
        prefix: String,
        false_label: String,
        end_label: String,
        elif_count: u32,
        else_seen: bool,
    },
    While {
        start_label: String,
        false_label: String,
    },
    For {
        dst: String,
        step: String,
        start_label: String,
        end_label: String,
    },
}

impl Frame {
    fn kind_name(&self) -> &'static str {
        match self {
            Frame::If { .. } => "if",
            Frame::While { .. } => "while",
            Frame::For { .. } => "for",
        }
    }
}

/// State of the single open function body, mirrored by `ret`.
#[derive(Debug)]
struct FunctionContext {
    saved: Vec<String>,
    reserved: u16,
}

pub struct Expander {
    frames: Vec<Frame>,
    function: Option<FunctionContext>,
    next_label: u32,
}

impl Default for Expander {
    fn default() -> Self {
        Self::new()
    }
}

impl Expander {
    pub fn new() -> Self {
        Self {
            frames: Vec::new(),
            function: None,
            next_label: 0,
        }
    }

    /// Expand one normalized line into primitive lines.
    pub fn expand_line(&mut self, line: &SourceLine) -> Result<Vec<String>, AsmError> {
        let tokens = line.tokens();
        let Some(&op) = tokens.first() else {
            return Ok(Vec::new());
        };

        match op {
            "def" => self.expand_def(&tokens),
            "ret" => self.expand_ret(&tokens),
            "call" => self.expand_call(&tokens),
            "if" => self.expand_if(&tokens),
            "elif" => self.expand_elif(&tokens),
            "else" => self.expand_else(&tokens),
            "while" => self.expand_while(&tokens),
            "for" => self.expand_for(&tokens),
            "end" => self.expand_end(&tokens),
            "jmp" => self.expand_jmp(&tokens),
            _ => Ok(vec![line.text.clone()]),
        }
    }

    /// End-of-input checks. Every open frame and an unclosed function body
    /// are structural errors.
    pub fn finish(&mut self) -> Vec<AsmError> {
        let mut errors = Vec::new();
        for frame in self.frames.drain(..) {
            errors.push(AsmError::new(
                AsmErrorKind::Nesting,
                "Construct left open at end of input",
                Some(frame.kind_name()),
            ));
        }
        if self.function.take().is_some() {
            errors.push(AsmError::new(
                AsmErrorKind::Function,
                "Function left open at end of input (missing ret)",
                None,
            ));
        }
        errors
    }

    fn fresh_prefix(&mut self, kind: &str) -> String {
        let id = self.next_label;
        self.next_label += 1;
        format!("_{kind}{id}")
    }

    fn jump(target: &str) -> String {
        format!("mov {target} pc")
    }

    fn expand_def(&mut self, tokens: &[&str]) -> Result<Vec<String>, AsmError> {
        if self.function.is_some() {
            return Err(AsmError::new(
                AsmErrorKind::Function,
                "def while a function is already open",
                None,
            ));
        }
        if !self.frames.is_empty() {
            return Err(AsmError::new(
                AsmErrorKind::Function,
                "def inside an open control-flow construct",
                Some(self.frames.last().map(Frame::kind_name).unwrap_or("?")),
            ));
        }
        let Some(&name) = tokens.get(1) else {
            return Err(AsmError::new(
                AsmErrorKind::Arity,
                "def expects a function name",
                None,
            ));
        };
        if is_int_or_register(name) {
            return Err(AsmError::new(
                AsmErrorKind::Lexical,
                "Function name must be a label",
                Some(name),
            ));
        }

        let (saved, reserved) = parse_def_tail(&tokens[2..])?;

        let mut code = vec![
            format!("label {name}"),
            "push bp".to_string(),
            "mov sp bp".to_string(),
        ];
        for reg in &saved {
            code.push(format!("push {reg}"));
        }
        if reserved > 0 {
            code.push(format!("sub sp {reserved} sp"));
        }

        self.function = Some(FunctionContext { saved, reserved });
        Ok(code)
    }

    fn expand_ret(&mut self, tokens: &[&str]) -> Result<Vec<String>, AsmError> {
        if self.function.is_none() {
            return Err(AsmError::new(
                AsmErrorKind::Function,
                "ret outside of a function",
                None,
            ));
        }
        if !self.frames.is_empty() {
            return Err(AsmError::new(
                AsmErrorKind::Function,
                "ret inside an open control-flow construct",
                Some(self.frames.last().map(Frame::kind_name).unwrap_or("?")),
            ));
        }
        check_arity("ret", 1, tokens.len() - 1)?;
        let value = tokens[1];
        require_src("ret value", value)?;

        let Some(context) = self.function.take() else {
            return Err(AsmError::new(
                AsmErrorKind::Function,
                "ret outside of a function",
                None,
            ));
        };
        let mut code = vec![format!("mov {value} rv")];
        if context.reserved > 0 {
            code.push(format!("add sp {} sp", context.reserved));
        }
        for reg in context.saved.iter().rev() {
            code.push(format!("pop {reg}"));
        }
        code.push("pop bp".to_string());
        code.push("pop pc".to_string());
        Ok(code)
    }

    fn expand_call(&mut self, tokens: &[&str]) -> Result<Vec<String>, AsmError> {
        let Some(&target) = tokens.get(1) else {
            return Err(AsmError::new(
                AsmErrorKind::Arity,
                "call expects a target",
                None,
            ));
        };
        let (saves, args) = parse_call_tail(&tokens[2..])?;

        let mut code = Vec::new();
        for reg in &saves {
            code.push(format!("push {reg}"));
        }
        // Arguments go on in reverse so the first one sits nearest the
        // return address.
        for arg in args.iter().rev() {
            code.push(format!("push {arg}"));
        }
        code.push("push pc+".to_string());
        code.push(Self::jump(target));
        if !args.is_empty() {
            code.push(format!("add sp {} sp", args.len()));
        }
        for reg in saves.iter().rev() {
            code.push(format!("pop {reg}"));
        }
        Ok(code)
    }

    fn expand_if(&mut self, tokens: &[&str]) -> Result<Vec<String>, AsmError> {
        check_arity("if", 3, tokens.len() - 1)?;
        let (cond, a, b) = require_test(&tokens[1..=3])?;

        let prefix = self.fresh_prefix("if");
        let true_label = format!("{prefix}_true");
        let false_label = format!("{prefix}_false");
        let end_label = format!("{prefix}_end");

        let code = vec![
            format!("{cond} {a} {b} {true_label}"),
            Self::jump(&false_label),
            format!("label {true_label}"),
        ];
        self.frames.push(Frame::If {
            prefix,
            false_label,
            end_label,
            elif_count: 0,
            else_seen: false,
        });
        Ok(code)
    }

    fn expand_elif(&mut self, tokens: &[&str]) -> Result<Vec<String>, AsmError> {
        check_arity("elif", 3, tokens.len() - 1)?;
        let (cond, a, b) = require_test(&tokens[1..=3])?;

        let Some(Frame::If {
            prefix,
            false_label,
            end_label,
            elif_count,
            else_seen,
        }) = self.frames.last_mut()
        else {
            return Err(AsmError::new(
                AsmErrorKind::Nesting,
                "elif without an open if",
                None,
            ));
        };
        if *else_seen {
            return Err(AsmError::new(
                AsmErrorKind::Nesting,
                "elif after else",
                None,
            ));
        }

        let index = *elif_count;
        let new_true = format!("{prefix}_true{index}");
        let new_false = format!("{prefix}_false{index}");
        let code = vec![
            Self::jump(end_label),
            format!("label {false_label}"),
            format!("{cond} {a} {b} {new_true}"),
            Self::jump(&new_false),
            format!("label {new_true}"),
        ];
        *false_label = new_false;
        *elif_count += 1;
        Ok(code)
    }

    fn expand_else(&mut self, tokens: &[&str]) -> Result<Vec<String>, AsmError> {
        check_arity("else", 0, tokens.len() - 1)?;
        let Some(Frame::If {
            false_label,
            end_label,
            else_seen,
            ..
        }) = self.frames.last_mut()
        else {
            return Err(AsmError::new(
                AsmErrorKind::Nesting,
                "else without an open if",
                None,
            ));
        };
        if *else_seen {
            return Err(AsmError::new(
                AsmErrorKind::Nesting,
                "else after else",
                None,
            ));
        }
        let code = vec![Self::jump(end_label), format!("label {false_label}")];
        *else_seen = true;
        Ok(code)
    }

    fn expand_while(&mut self, tokens: &[&str]) -> Result<Vec<String>, AsmError> {
        check_arity("while", 3, tokens.len() - 1)?;
        let (cond, a, b) = require_test(&tokens[1..=3])?;

        let prefix = self.fresh_prefix("while");
        let start_label = format!("{prefix}_start");
        let true_label = format!("{prefix}_true");
        let false_label = format!("{prefix}_false");

        let code = vec![
            format!("label {start_label}"),
            format!("{cond} {a} {b} {true_label}"),
            Self::jump(&false_label),
            format!("label {true_label}"),
        ];
        self.frames.push(Frame::While {
            start_label,
            false_label,
        });
        Ok(code)
    }

    fn expand_for(&mut self, tokens: &[&str]) -> Result<Vec<String>, AsmError> {
        let operands = tokens.len() - 1;
        if !(3..=4).contains(&operands) {
            let message = format!("for expects 3 or 4 operands, got {operands}");
            return Err(AsmError::new(AsmErrorKind::Arity, &message, None));
        }
        let dst = tokens[1];
        let start = tokens[2];
        let stop = tokens[3];
        let step = tokens.get(4).copied().unwrap_or("1");
        require_register("for loop variable", dst)?;
        require_src("for start", start)?;
        require_src("for stop", stop)?;
        require_src("for step", step)?;

        let prefix = self.fresh_prefix("for");
        let start_label = format!("{prefix}_start");
        let body_label = format!("{prefix}_body");
        let end_label = format!("{prefix}_end");

        let code = vec![
            format!("mov {start} {dst}"),
            format!("label {start_label}"),
            format!("lt {dst} {stop} {body_label}"),
            Self::jump(&end_label),
            format!("label {body_label}"),
        ];
        self.frames.push(Frame::For {
            dst: dst.to_string(),
            step: step.to_string(),
            start_label,
            end_label,
        });
        Ok(code)
    }

    fn expand_end(&mut self, tokens: &[&str]) -> Result<Vec<String>, AsmError> {
        check_arity("end", 0, tokens.len() - 1)?;
        let Some(frame) = self.frames.pop() else {
            return Err(AsmError::new(
                AsmErrorKind::Nesting,
                "end without an open construct",
                None,
            ));
        };
        Ok(match frame {
            Frame::If {
                false_label,
                end_label,
                elif_count,
                else_seen,
                ..
            } => {
                if else_seen {
                    vec![format!("label {end_label}")]
                } else if elif_count > 0 {
                    // The last elif's false target still dangles; it lands
                    // here together with the end label.
                    vec![format!("label {false_label}"), format!("label {end_label}")]
                } else {
                    // No branch ever jumped to a distinct end label.
                    vec![format!("label {false_label}")]
                }
            }
            Frame::While {
                start_label,
                false_label,
            } => vec![Self::jump(&start_label), format!("label {false_label}")],
            Frame::For {
                dst,
                step,
                start_label,
                end_label,
            } => vec![
                format!("add {dst} {step} {dst}"),
                Self::jump(&start_label),
                format!("label {end_label}"),
            ],
        })
    }

    fn expand_jmp(&mut self, tokens: &[&str]) -> Result<Vec<String>, AsmError> {
        check_arity("jmp", 1, tokens.len() - 1)?;
        Ok(vec![Self::jump(tokens[1])])
    }

    /// Depth of the nesting stack, for tests and end-of-run assertions.
    pub fn open_frames(&self) -> usize {
        self.frames.len()
    }

    pub fn in_function(&self) -> bool {
        self.function.is_some()
    }
}

fn check_arity(op: &str, expected: usize, actual: usize) -> Result<(), AsmError> {
    if expected != actual {
        let message = format!("{op} expects {expected} operands, got {actual}");
        return Err(AsmError::new(AsmErrorKind::Arity, &message, None));
    }
    Ok(())
}

fn require_src(what: &str, tok: &str) -> Result<(), AsmError> {
    if is_int_or_register(tok) {
        Ok(())
    } else {
        let message = format!("{what} must be an integer or register");
        Err(AsmError::new(AsmErrorKind::Lexical, &message, Some(tok)))
    }
}

fn require_register(what: &str, tok: &str) -> Result<(), AsmError> {
    if is_register(tok) {
        Ok(())
    } else {
        let message = format!("{what} must be a register");
        Err(AsmError::new(AsmErrorKind::Lexical, &message, Some(tok)))
    }
}

fn require_test<'a>(tokens: &[&'a str]) -> Result<(&'a str, &'a str, &'a str), AsmError> {
    let (cond, a, b) = (tokens[0], tokens[1], tokens[2]);
    if !is_condition(cond) {
        return Err(AsmError::new(
            AsmErrorKind::Lexical,
            "Not a recognized comparison",
            Some(cond),
        ));
    }
    require_src("comparison operand", a)?;
    require_src("comparison operand", b)?;
    Ok((cond, a, b))
}

fn parse_def_tail(tokens: &[&str]) -> Result<(Vec<String>, u16), AsmError> {
    #[derive(PartialEq)]
    enum Mode {
        None,
        Save,
        Reserve,
    }
    let mut mode = Mode::None;
    let mut saved = Vec::new();
    let mut reserved: Option<u16> = None;
    for &tok in tokens {
        match tok {
            "save" => mode = Mode::Save,
            "reserve" => mode = Mode::Reserve,
            _ => match mode {
                Mode::Save => {
                    if CALLEE_SAVED.contains(&tok) {
                        saved.push(tok.to_string());
                    } else {
                        return Err(AsmError::new(
                            AsmErrorKind::Function,
                            "Register is not callee-saved",
                            Some(tok),
                        ));
                    }
                }
                Mode::Reserve => {
                    if reserved.is_some() {
                        return Err(AsmError::new(
                            AsmErrorKind::Arity,
                            "reserve takes a single count",
                            Some(tok),
                        ));
                    }
                    let count = parse_int(tok).filter(|v| (0..=0xFFFF).contains(v));
                    match count {
                        Some(count) => reserved = Some(count as u16),
                        None => {
                            return Err(AsmError::new(
                                AsmErrorKind::Lexical,
                                "reserve count must be a non-negative integer",
                                Some(tok),
                            ))
                        }
                    }
                }
                Mode::None => {
                    return Err(AsmError::new(
                        AsmErrorKind::Lexical,
                        "Unexpected token in def (want save or reserve)",
                        Some(tok),
                    ))
                }
            },
        }
    }
    Ok((saved, reserved.unwrap_or(0)))
}

fn parse_call_tail(tokens: &[&str]) -> Result<(Vec<String>, Vec<String>), AsmError> {
    #[derive(PartialEq)]
    enum Mode {
        None,
        Save,
        Args,
    }
    let mut mode = Mode::None;
    let mut saves = Vec::new();
    let mut args = Vec::new();
    for &tok in tokens {
        match tok {
            "save" => mode = Mode::Save,
            "args" => mode = Mode::Args,
            _ => match mode {
                Mode::Save => {
                    if CALLER_SAVED.contains(&tok) {
                        saves.push(tok.to_string());
                    } else {
                        return Err(AsmError::new(
                            AsmErrorKind::Function,
                            "Register is not caller-saved",
                            Some(tok),
                        ));
                    }
                }
                Mode::Args => {
                    require_src("call argument", tok)?;
                    args.push(tok.to_string());
                }
                Mode::None => {
                    return Err(AsmError::new(
                        AsmErrorKind::Lexical,
                        "Unexpected token in call (want save or args)",
                        Some(tok),
                    ))
                }
            },
        }
    }
    Ok((saves, args))
}
