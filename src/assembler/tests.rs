// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright (C) 2026 Erik van der Tier

//! End-to-end tests driving the library entry points.

use super::output::{build_labels_text, build_stream_text};
use super::{AsmErrorKind, OutputFormat, Severity, assemble_lines};

use crate::core::encoder::EMPTY;
use crate::core::machine::Machine;

fn lines(src: &str) -> Vec<String> {
    src.lines().map(str::to_string).collect()
}

fn assemble(src: &str) -> super::AssemblyOutput {
    assemble_lines(&lines(src)).expect("assemble")
}

fn run_machine(src: &str) -> Machine {
    let output = assemble(src);
    let mut machine = Machine::new(output.words);
    machine.run(100_000).expect("run");
    machine
}

#[test]
fn straight_line_program_emits_one_record_per_instruction() {
    let output = assemble("mov 1 r0\nadd r0 2 r1\nnop");
    assert_eq!(output.words.len(), 3);
    assert_eq!(output.words[2], [0, EMPTY, EMPTY, EMPTY]);
}

#[test]
fn comments_and_case_do_not_change_the_stream() {
    let plain = assemble("mov 1 r0\nadd r0 2 r1");
    let noisy = assemble("; header\nMOV 1 R0 ; set up\n\n  ADD r0 2 R1  ");
    assert_eq!(plain.words, noisy.words);
}

#[test]
fn if_branch_executes_only_on_equal_values() {
    let taken = run_machine("mov 3 r0\nif eq r0 3\nmov 1 r1\nend");
    assert_eq!(taken.reg(1), 1);

    let skipped = run_machine("mov 4 r0\nif eq r0 3\nmov 1 r1\nend");
    assert_eq!(skipped.reg(1), 0);
}

#[test]
fn nested_loops_multiply_trip_counts() {
    let machine = run_machine("for r1 0 3\nfor r2 0 4\nadd r0 1 r0\nend\nend");
    assert_eq!(machine.reg(0), 12);
}

#[test]
fn function_call_preserves_caller_saved_registers() {
    let src = "\
mov 5 r0
mov 6 r1
jmp main
def clobber save r3
mov 0 r3
ret 1
label main
call clobber save r0 r1
mov rv r2";
    let machine = run_machine(src);
    assert_eq!(machine.reg(0), 5);
    assert_eq!(machine.reg(1), 6);
    assert_eq!(machine.reg(2), 1);
    assert_eq!(machine.stack_depth(), 0);
}

#[test]
fn expanded_listing_reassembles_to_the_same_stream() {
    let src = "\
mov 0 r0
for r1 0 5
if eq r1 2
add r0 10 r0
else
add r0 1 r0
end
end";
    let first = assemble(src);
    let listing: Vec<String> = first
        .expanded
        .iter()
        .map(|line| line.text.clone())
        .collect();
    let second = assemble_lines(&listing).expect("reassemble expanded listing");
    assert_eq!(first.words, second.words);
    assert_eq!(first.labels, second.labels);
}

#[test]
fn labels_bind_to_record_addresses() {
    let output = assemble("nop\nnop\nlabel here\nmov here pc");
    assert_eq!(output.labels["here"], 2);
    assert_eq!(output.words[2][1], 2);
}

#[test]
fn failed_run_reports_every_independent_error() {
    let err = assemble_lines(&lines("frobnicate r0\nadd r0 r1\nmov 1 r9"))
        .expect_err("three bad lines");
    assert_eq!(err.to_string(), "Errors detected in source. No instruction stream created.");
    let kinds: Vec<AsmErrorKind> = err.diagnostics().iter().map(|d| d.kind()).collect();
    assert_eq!(
        kinds,
        vec![
            AsmErrorKind::Mnemonic,
            AsmErrorKind::Arity,
            AsmErrorKind::Lexical,
        ]
    );
    assert_eq!(err.diagnostics()[0].line(), 1);
    assert_eq!(err.diagnostics()[1].line(), 2);
    assert_eq!(err.diagnostics()[2].line(), 3);
}

#[test]
fn undefined_label_is_a_linkage_error_with_the_name() {
    let err = assemble_lines(&lines("mov nowhere pc")).expect_err("undefined label");
    assert_eq!(err.diagnostics().len(), 1);
    let diag = &err.diagnostics()[0];
    assert_eq!(diag.kind(), AsmErrorKind::Linkage);
    assert_eq!(diag.code(), "mf302");
    assert!(diag.message().contains("nowhere"));
}

#[test]
fn unbalanced_construct_at_eof_is_reported_on_the_last_line() {
    let err = assemble_lines(&lines("mov 1 r0\nwhile lt r0 5\nadd r0 1 r0"))
        .expect_err("missing end");
    let diag = &err.diagnostics()[0];
    assert_eq!(diag.kind(), AsmErrorKind::Nesting);
    assert_eq!(diag.line(), 3);
}

#[test]
fn duplicate_label_keeps_first_binding_and_errors() {
    let err = assemble_lines(&lines("label twice\nnop\nlabel twice"))
        .expect_err("duplicate label");
    let diag = &err.diagnostics()[0];
    assert_eq!(diag.kind(), AsmErrorKind::Label);
    assert_eq!(diag.code(), "mf301");
    assert_eq!(diag.line(), 3);
}

#[test]
fn warnings_survive_a_successful_run() {
    let output = assemble("mov 1 pc+\nmov 1 r0");
    assert_eq!(output.words.len(), 2, "warning must not block emission");
    assert_eq!(output.diagnostics.len(), 1);
    assert_eq!(output.diagnostics[0].severity(), Severity::Warning);
    assert_eq!(output.diagnostics[0].line(), 1);
}

#[test]
fn structural_error_does_not_stop_later_lines_from_assembling() {
    let err = assemble_lines(&lines("end\nbogus r0\nmov 1 r0"))
        .expect_err("two errors");
    assert_eq!(err.diagnostics().len(), 2);
    assert_eq!(err.diagnostics()[0].kind(), AsmErrorKind::Nesting);
    assert_eq!(err.diagnostics()[1].kind(), AsmErrorKind::Mnemonic);
}

#[test]
fn stream_text_round_trips_through_the_documented_format() {
    let output = assemble("mov 7 r1\nnop");
    let text = build_stream_text(&output.words);
    let mut parsed = Vec::new();
    for line in text.lines() {
        let words: Vec<u16> = line
            .split(' ')
            .map(|tok| tok.parse().expect("decimal u16"))
            .collect();
        assert_eq!(words.len(), 4);
        parsed.push([words[0], words[1], words[2], words[3]]);
    }
    assert_eq!(parsed, output.words);
}

#[test]
fn labels_output_includes_synthetic_labels() {
    let output = assemble("if eq r0 0\nnop\nend");
    let text = build_labels_text(&output.labels, OutputFormat::Text);
    assert!(text.contains("_if0_true = "));
    assert!(text.contains("_if0_false = "));
}

#[test]
fn while_loop_with_signed_test_terminates() {
    // Counts r0 down from 3 through 0; gts treats 0xFFFF as -1 and stops.
    let machine = run_machine("mov 3 r0\nwhile gts r0 -1\nsub r0 1 r0\nadd r1 1 r1\nend");
    assert_eq!(machine.reg(1), 4);
}
