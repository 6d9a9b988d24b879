// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright (C) 2026 Erik van der Tier

//! Assembler run/pass orchestration.
//!
//! This module owns CLI-driven run flow, input resolution, and the
//! expand/encode/resolve pass sequencing per input file.

use super::*;

/// Run the assembler with command-line arguments.
pub fn run() -> Result<Vec<AsmRunReport>, AsmRunError> {
    let cli = Cli::parse();
    run_with_cli(&cli)
}

pub fn run_with_cli(cli: &Cli) -> Result<Vec<AsmRunReport>, AsmRunError> {
    let config = validate_cli(cli)?;

    let mut reports = Vec::new();
    for input_path in &config.input_paths {
        let (source_name, input_base) =
            input_base_from_path(input_path, &config.input_extensions)?;
        let report = run_one(&source_name, &input_base, &config)?;
        reports.push(report);
    }

    if config.warning_policy.treat_warnings_as_errors {
        let mut warning_diags = Vec::new();
        let mut source_lines = Vec::new();
        for report in &reports {
            if source_lines.is_empty() {
                source_lines = report.source_lines().to_vec();
            }
            for diag in report.diagnostics() {
                if diag.severity() == Severity::Warning {
                    let mut warning = diag.clone();
                    warning.severity = Severity::Error;
                    warning_diags.push(warning);
                }
            }
        }
        if !warning_diags.is_empty() {
            return Err(AsmRunError::new(
                AsmError::new(
                    AsmErrorKind::Assembler,
                    "Warnings treated as errors (--Werror)",
                    None,
                ),
                warning_diags,
                source_lines,
            ));
        }
    }

    Ok(reports)
}

/// Assemble the given raw source lines all the way to resolved records.
///
/// This is the library entry the CLI flow and the end-to-end tests share;
/// file IO stays in `run_one`.
pub fn assemble_lines(lines: &[String]) -> Result<AssemblyOutput, AsmRunError> {
    let source_lines = Arc::new(lines.to_vec());
    let normalized = normalize(lines);

    let mut assembler = Assembler::new();
    let expand = assembler.expand_pass(&normalized);
    let encode = assembler.encode_pass();
    let resolve = assembler.resolve_pass();

    let errors = expand.errors + encode.errors + resolve.errors;
    if errors > 0 {
        return Err(AsmRunError::new(
            AsmError::new(
                AsmErrorKind::Assembler,
                "Errors detected in source. No instruction stream created.",
                None,
            ),
            assembler.take_diagnostics(),
            source_lines,
        ));
    }

    let expanded = assembler.expanded_lines().to_vec();
    let labels = assembler.labels().clone();
    let words = assembler.resolved_words().to_vec();
    Ok(AssemblyOutput {
        words,
        labels,
        expanded,
        diagnostics: assembler.take_diagnostics(),
        source_lines,
    })
}

fn run_one(
    source_name: &str,
    input_base: &str,
    config: &CliConfig,
) -> Result<AsmRunReport, AsmRunError> {
    let text = fs::read_to_string(source_name).map_err(|err| {
        AsmRunError::new(
            AsmError::new(
                AsmErrorKind::Io,
                &format!("Error reading input file: {err}"),
                Some(source_name),
            ),
            Vec::new(),
            Vec::new(),
        )
    })?;
    let lines: Vec<String> = text.lines().map(str::to_string).collect();

    let output = assemble_lines(&lines)?;

    let out_base = config.out_base.as_deref().unwrap_or(input_base);
    let stream_path = resolve_output_path(out_base, Some(String::new()), "mfs")
        .unwrap_or_else(|| format!("{out_base}.mfs"));
    emit_stream_file(
        Path::new(&stream_path),
        &output.words,
        output.source_lines.clone(),
    )?;

    if let Some(path) = &config.labels_file {
        emit_labels_file(
            path,
            &output.labels,
            config.output_format,
            output.source_lines.clone(),
        )?;
    }

    if let Some(path) = &config.expanded_file {
        emit_expanded_file(path, &output.expanded, output.source_lines.clone())?;
    }

    Ok(AsmRunReport::new(output.diagnostics, output.source_lines))
}
