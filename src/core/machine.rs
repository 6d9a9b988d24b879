// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright (C) 2026 Erik van der Tier

//! Reference interpreter for resolved 4-word records.
//!
//! Executes the assembler's output directly so behavioral properties of the
//! lowering (loop trip counts, call/return stack balance) can be checked
//! without the hardware. Instruction addresses index the record stream;
//! data memory is a separate flat 16-bit space holding the stack.

use std::fmt;

use crate::core::encoder::{
    decode_control, mnemonic_for, REG_PC, REG_PC_NEXT, REG_PC_PREV, REG_SP,
};

/// Initial stack pointer. The stack grows downward from here.
pub const STACK_TOP: u16 = 0xFF00;

const MEMORY_WORDS: usize = 0x1_0000;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MachineError {
    /// `div` or `mod` with a zero divisor.
    DivideByZero { address: u16 },
    /// Control word does not decode to a known instruction.
    IllegalInstruction { address: u16, control: u16 },
    /// Operand names a register index outside the register file.
    IllegalRegister { address: u16, index: u16 },
    /// The run exceeded the step budget.
    StepLimit { limit: u64 },
}

impl fmt::Display for MachineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MachineError::DivideByZero { address } => {
                write!(f, "division by zero at address {address}")
            }
            MachineError::IllegalInstruction { address, control } => {
                write!(f, "illegal instruction {control:#06x} at address {address}")
            }
            MachineError::IllegalRegister { address, index } => {
                write!(f, "illegal register index {index} at address {address}")
            }
            MachineError::StepLimit { limit } => {
                write!(f, "program did not halt within {limit} steps")
            }
        }
    }
}

impl std::error::Error for MachineError {}

pub struct Machine {
    program: Vec<[u16; 4]>,
    /// r0..r5, rv, bp, sp. The pc views are computed, not stored.
    regs: [u16; 9],
    memory: Vec<u16>,
    pc: u16,
    steps: u64,
}

impl Machine {
    pub fn new(program: Vec<[u16; 4]>) -> Self {
        let mut regs = [0u16; 9];
        regs[REG_SP as usize] = STACK_TOP;
        Self {
            program,
            regs,
            memory: vec![0; MEMORY_WORDS],
            pc: 0,
            steps: 0,
        }
    }

    /// Read one of the nine stored registers.
    ///
    /// # Panics
    ///
    /// Panics if `index` is not in `0..=8`; the computed `pc` views are not
    /// stored registers.
    pub fn reg(&self, index: u16) -> u16 {
        self.regs[index as usize]
    }

    /// Write one of the nine stored registers.
    ///
    /// # Panics
    ///
    /// Panics if `index` is not in `0..=8`.
    pub fn set_reg(&mut self, index: u16, value: u16) {
        self.regs[index as usize] = value;
    }

    /// Read a data-memory word. Memory spans the full 16-bit address space,
    /// so every `u16` address is in bounds.
    pub fn memory(&self, address: u16) -> u16 {
        self.memory[address as usize]
    }

    pub fn pc(&self) -> u16 {
        self.pc
    }

    pub fn steps(&self) -> u64 {
        self.steps
    }

    /// Words currently on the stack.
    pub fn stack_depth(&self) -> u16 {
        STACK_TOP.wrapping_sub(self.regs[REG_SP as usize])
    }

    /// Run until control falls off the end of the program.
    pub fn run(&mut self, max_steps: u64) -> Result<(), MachineError> {
        while (self.pc as usize) < self.program.len() {
            if self.steps >= max_steps {
                return Err(MachineError::StepLimit { limit: max_steps });
            }
            self.step()?;
        }
        Ok(())
    }

    /// Execute one record.
    ///
    /// # Panics
    ///
    /// Panics if `pc` is past the end of the program; `run` only calls this
    /// while `pc` addresses a record.
    pub fn step(&mut self) -> Result<(), MachineError> {
        let address = self.pc;
        let [control, op1, op2, op3] = self.program[address as usize];
        let (opcode, subtype, subfunc, imm1, imm2) = decode_control(control);
        let Some(mnemonic) = mnemonic_for(opcode, subtype, subfunc) else {
            return Err(MachineError::IllegalInstruction { address, control });
        };

        self.steps += 1;
        let mut next = address.wrapping_add(1);

        match mnemonic {
            "nop" => {}
            "mov" => {
                let value = self.read_operand(op1, imm1, address)?;
                self.write_reg(op3, value, address, &mut next)?;
            }
            "push" => {
                let value = self.read_operand(op1, imm1, address)?;
                self.push(value);
            }
            "pop" => {
                let value = self.pop();
                self.write_reg(op3, value, address, &mut next)?;
            }
            "not" | "neg" => {
                let a = self.read_operand(op1, imm1, address)?;
                let result = match mnemonic {
                    "not" => !a,
                    _ => a.wrapping_neg(),
                };
                self.write_reg(op3, result, address, &mut next)?;
            }
            "eq" | "lt" | "lte" | "gt" | "gte" | "lts" | "ltes" | "gts" | "gtes" => {
                let a = self.read_operand(op1, imm1, address)?;
                let b = self.read_operand(op2, imm2, address)?;
                if compare(mnemonic, a, b) {
                    next = op3;
                }
            }
            _ => {
                let a = self.read_operand(op1, imm1, address)?;
                let b = self.read_operand(op2, imm2, address)?;
                let result = match mnemonic {
                    "and" => a & b,
                    "or" => a | b,
                    "nand" => !(a & b),
                    "nor" => !(a | b),
                    "xor" => a ^ b,
                    "xnor" => !(a ^ b),
                    "shl" => a.wrapping_shl(b as u32),
                    "shr" => a.wrapping_shr(b as u32),
                    "rol" => a.rotate_left(b as u32 % 16),
                    "ror" => a.rotate_right(b as u32 % 16),
                    "ashr" => (a as i16).wrapping_shr(b as u32) as u16,
                    "add" => a.wrapping_add(b),
                    "sub" => a.wrapping_sub(b),
                    "mul" => a.wrapping_mul(b),
                    "div" => {
                        if b == 0 {
                            return Err(MachineError::DivideByZero { address });
                        }
                        a / b
                    }
                    "mod" => {
                        if b == 0 {
                            return Err(MachineError::DivideByZero { address });
                        }
                        a % b
                    }
                    _ => return Err(MachineError::IllegalInstruction { address, control }),
                };
                self.write_reg(op3, result, address, &mut next)?;
            }
        }

        self.pc = next;
        Ok(())
    }

    fn read_operand(&self, word: u16, immediate: bool, address: u16) -> Result<u16, MachineError> {
        if immediate {
            return Ok(word);
        }
        self.read_reg(word, address)
    }

    /// The pc views read relative to the address of the next instruction:
    /// `pc` is that address itself, `pc-` one before it, `pc+` one past it.
    fn read_reg(&self, index: u16, address: u16) -> Result<u16, MachineError> {
        match index {
            0..=8 => Ok(self.regs[index as usize]),
            i if i == REG_PC => Ok(address.wrapping_add(1)),
            i if i == REG_PC_PREV => Ok(address),
            i if i == REG_PC_NEXT => Ok(address.wrapping_add(2)),
            _ => Err(MachineError::IllegalRegister { address, index }),
        }
    }

    fn write_reg(
        &mut self,
        index: u16,
        value: u16,
        address: u16,
        next: &mut u16,
    ) -> Result<(), MachineError> {
        match index {
            0..=8 => {
                self.regs[index as usize] = value;
                Ok(())
            }
            i if i == REG_PC => {
                *next = value;
                Ok(())
            }
            // Writes to the read-only pc views are dropped.
            i if i == REG_PC_PREV || i == REG_PC_NEXT => Ok(()),
            _ => Err(MachineError::IllegalRegister { address, index }),
        }
    }

    fn push(&mut self, value: u16) {
        let sp = self.regs[REG_SP as usize].wrapping_sub(1);
        self.regs[REG_SP as usize] = sp;
        self.memory[sp as usize] = value;
    }

    fn pop(&mut self) -> u16 {
        let sp = self.regs[REG_SP as usize];
        let value = self.memory[sp as usize];
        self.regs[REG_SP as usize] = sp.wrapping_add(1);
        value
    }
}

fn compare(mnemonic: &str, a: u16, b: u16) -> bool {
    let (sa, sb) = (a as i16, b as i16);
    match mnemonic {
        "eq" => a == b,
        "lt" => a < b,
        "lte" => a <= b,
        "gt" => a > b,
        "gte" => a >= b,
        "lts" => sa < sb,
        "ltes" => sa <= sb,
        "gts" => sa > sb,
        "gtes" => sa >= sb,
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::encoder::Encoder;
    use crate::core::expander::Expander;
    use crate::core::normalize::{normalize, SourceLine};
    use crate::core::resolver::resolve;

    /// Assemble structured source straight through to resolved records.
    fn assemble(src: &str) -> Vec<[u16; 4]> {
        let raw: Vec<String> = src.lines().map(|l| l.to_string()).collect();
        let mut expander = Expander::new();
        let mut encoder = Encoder::new();
        let mut records = Vec::new();
        for line in normalize(&raw) {
            for text in expander.expand_line(&line).expect("expand") {
                let primitive = SourceLine::new(line.line, text);
                if let Some(record) = encoder.encode_line(&primitive).expect("encode") {
                    records.push(record);
                }
            }
        }
        assert!(expander.finish().is_empty(), "unbalanced test program");
        let labels = encoder.into_labels();
        let (words, errors) = resolve(&records, &labels);
        assert!(errors.is_empty(), "unresolved labels in test program");
        words
    }

    fn run(src: &str) -> Machine {
        let mut machine = Machine::new(assemble(src));
        machine.run(10_000).expect("run");
        machine
    }

    #[test]
    fn arithmetic_with_immediates() {
        let machine = run("mov 5 r0\nadd r0 3 r0\nsub r0 10 r1");
        assert_eq!(machine.reg(0), 8);
        assert_eq!(machine.reg(1), 0xFFFEu16, "subtraction wraps");
    }

    #[test]
    fn push_pop_round_trip_restores_sp() {
        let machine = run("mov 42 r0\npush r0\npush 7\npop r1\npop r2");
        assert_eq!(machine.reg(1), 7);
        assert_eq!(machine.reg(2), 42);
        assert_eq!(machine.stack_depth(), 0);
    }

    #[test]
    fn conditional_jump_skips_when_false() {
        let machine = run("mov 1 r0\neq r0 2 skip\nmov 99 r1\nlabel skip\nnop");
        assert_eq!(machine.reg(1), 99, "false comparison falls through");

        let machine = run("mov 2 r0\neq r0 2 skip\nmov 99 r1\nlabel skip\nnop");
        assert_eq!(machine.reg(1), 0, "true comparison jumps");
    }

    #[test]
    fn signed_comparison_differs_from_unsigned() {
        // 0xFFFF is -1 signed but 65535 unsigned.
        let machine = run("mov -1 r0\nlts r0 0 below\nmov 1 r1\nlabel below\nlt r0 1 small\nmov 1 r2\nlabel small\nnop");
        assert_eq!(machine.reg(1), 0, "lts treats 0xFFFF as negative");
        assert_eq!(machine.reg(2), 1, "lt treats 0xFFFF as large");
    }

    #[test]
    fn for_loop_executes_body_stop_minus_start_times() {
        let machine = run("for r1 0 3\nadd r0 1 r0\nend");
        assert_eq!(machine.reg(0), 3);
        assert_eq!(machine.reg(1), 3, "loop variable ends at stop");
    }

    #[test]
    fn for_loop_with_step_two() {
        let machine = run("for r1 0 10 2\nadd r0 1 r0\nend");
        assert_eq!(machine.reg(0), 5);
    }

    #[test]
    fn while_loop_counts_down() {
        let machine = run("mov 4 r0\nwhile gt r0 0\nsub r0 1 r0\nadd r1 1 r1\nend");
        assert_eq!(machine.reg(0), 0);
        assert_eq!(machine.reg(1), 4);
    }

    #[test]
    fn if_else_takes_exactly_one_branch() {
        let machine = run("mov 1 r0\nif eq r0 1\nmov 10 r1\nelse\nmov 20 r1\nend");
        assert_eq!(machine.reg(1), 10);

        let machine = run("mov 2 r0\nif eq r0 1\nmov 10 r1\nelse\nmov 20 r1\nend");
        assert_eq!(machine.reg(1), 20);
    }

    #[test]
    fn elif_chain_dispatches_on_first_true_test() {
        let src = "mov 1 r0\nif eq r0 0\nmov 10 r1\nelif eq r0 1\nmov 11 r1\nelif eq r0 2\nmov 12 r1\nend";
        assert_eq!(run(src).reg(1), 11);
    }

    #[test]
    fn call_and_ret_balance_the_stack_and_return_a_value() {
        let src = "\
jmp main
def double save r3 reserve 1
mov 21 r3
add r3 r3 rv
ret rv
label main
call double args 21 save r0
mov rv r2";
        let machine = run(src);
        assert_eq!(machine.reg(2), 42);
        assert_eq!(machine.stack_depth(), 0, "call must be stack neutral");
    }

    #[test]
    fn simple_function_returns_through_rv() {
        let src = "\
jmp main
def seven
ret 7
label main
call seven
mov rv r0";
        let machine = run(src);
        assert_eq!(machine.reg(0), 7);
        assert_eq!(machine.stack_depth(), 0);
    }

    #[test]
    fn division_by_zero_is_a_machine_error() {
        let mut machine = Machine::new(assemble("mov 0 r1\ndiv 5 r1 r0"));
        let err = machine.run(100).expect_err("divide by zero");
        assert!(matches!(err, MachineError::DivideByZero { address: 1 }));
    }

    #[test]
    fn infinite_loop_hits_the_step_limit() {
        let mut machine = Machine::new(assemble("label spin\njmp spin"));
        let err = machine.run(50).expect_err("must not halt");
        assert!(matches!(err, MachineError::StepLimit { limit: 50 }));
    }

    #[test]
    fn memory_spans_the_full_address_space() {
        let machine = Machine::new(Vec::new());
        assert_eq!(machine.memory(0), 0);
        assert_eq!(machine.memory(u16::MAX), 0);
    }

    #[test]
    fn writes_to_pc_views_are_dropped() {
        // The encoder warns on this but still emits it; the machine ignores it.
        let machine = run("mov 5 pc+\nmov 1 r0");
        assert_eq!(machine.reg(0), 1);
    }
}
