// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright (C) 2026 Erik van der Tier

//! Command-line interface parsing and argument validation.

use std::env;
use std::path::{Path, PathBuf};

use clap::{ArgAction, Parser, ValueEnum};

use crate::core::error::{AsmError, AsmErrorKind, AsmRunError};

pub const VERSION: &str = env!("CARGO_PKG_VERSION");

const LONG_ABOUT: &str =
    "Macro-assembler for a 16-bit register machine with structured control flow.

Lowers if/elif/else, while, for, and def/ret/call into primitive
instructions, encodes them into 4-word records, and resolves labels to
instruction addresses. The instruction stream is written to <base>.mfs;
use -o/--outfile to change the base name.
--labels and --expanded write the resolved label table and the
macro-expanded intermediate listing alongside the stream.";

#[derive(Parser, Debug)]
#[command(
    name = "macroForge",
    version = VERSION,
    about = "Macro-assembler lowering structured control flow for a 16-bit register machine",
    long_about = LONG_ABOUT
)]
pub struct Cli {
    #[arg(
        long = "format",
        value_enum,
        default_value_t = OutputFormat::Text,
        long_help = "Select global CLI output format. text is default; json enables machine-readable diagnostics and label output."
    )]
    pub format: OutputFormat,
    #[arg(
        short = 'q',
        long = "quiet",
        action = ArgAction::SetTrue,
        long_help = "Suppress diagnostic output for successful assembly runs. Errors are still reported unless --no-error is set."
    )]
    pub quiet: bool,
    #[arg(
        short = 'E',
        long = "error",
        value_name = "FILE",
        long_help = "Write diagnostics to FILE instead of stderr."
    )]
    pub error_file: Option<PathBuf>,
    #[arg(
        long = "error-append",
        action = ArgAction::SetTrue,
        requires = "error_file",
        long_help = "Append diagnostics to --error FILE instead of truncating it."
    )]
    pub error_append: bool,
    #[arg(
        long = "no-error",
        action = ArgAction::SetTrue,
        conflicts_with_all = ["error_file", "error_append"],
        long_help = "Disable all diagnostic output routing."
    )]
    pub no_error: bool,
    #[arg(
        short = 'w',
        long = "no-warn",
        action = ArgAction::SetTrue,
        conflicts_with = "warn_error",
        long_help = "Suppress warning diagnostics."
    )]
    pub no_warn: bool,
    #[arg(
        long = "Werror",
        action = ArgAction::SetTrue,
        long_help = "Treat warnings as errors (non-zero exit status)."
    )]
    pub warn_error: bool,
    #[arg(
        short = 'o',
        long = "outfile",
        value_name = "BASE",
        long_help = "Output filename base for the instruction stream. Defaults to the input base. Not allowed with multiple inputs."
    )]
    pub outfile: Option<String>,
    #[arg(
        long = "labels",
        value_name = "FILE",
        long_help = "Write the resolved label table to FILE (text, or JSON with --format json)."
    )]
    pub labels_file: Option<PathBuf>,
    #[arg(
        long = "expanded",
        value_name = "FILE",
        long_help = "Write the macro-expanded intermediate listing to FILE. The listing is itself valid assembler input."
    )]
    pub expanded_file: Option<PathBuf>,
    #[arg(
        short = 'i',
        long = "infile",
        value_name = "FILE",
        action = ArgAction::Append,
        long_help = "Input source file (repeatable). Files must use an accepted source extension."
    )]
    pub infiles: Vec<PathBuf>,
    #[arg(
        value_name = "INPUT",
        action = ArgAction::Append,
        long_help = "Optional positional input. Exactly one positional INPUT is accepted and treated like -i INPUT. Multiple inputs require explicit -i/--infile."
    )]
    pub positional_inputs: Vec<PathBuf>,
    #[arg(
        long = "input-ext",
        value_name = "EXT",
        action = ArgAction::Append,
        long_help = "Additional accepted source-file extension (repeatable). Defaults to masm."
    )]
    pub input_exts: Vec<String>,
}

#[derive(Debug, Clone)]
pub enum DiagnosticsSinkConfig {
    Stderr,
    File { path: PathBuf, append: bool },
    Disabled,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct WarningPolicy {
    pub emit_warnings: bool,
    pub treat_warnings_as_errors: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
}

fn cli_error(msg: impl AsRef<str>) -> AsmRunError {
    AsmRunError::new(
        AsmError::new(AsmErrorKind::Cli, msg.as_ref(), None),
        Vec::new(),
        Vec::new(),
    )
}

fn parse_env_bool(name: &str) -> Result<Option<bool>, AsmRunError> {
    match env::var(name) {
        Ok(value) => match value.to_ascii_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => Ok(Some(true)),
            "0" | "false" | "no" | "off" => Ok(Some(false)),
            other => Err(cli_error(format!(
                "Invalid {name} value: {other}. Expected a boolean"
            ))),
        },
        Err(_) => Ok(None),
    }
}

fn parse_env_path(name: &str) -> Result<Option<PathBuf>, AsmRunError> {
    match env::var(name) {
        Ok(value) if value.is_empty() => Ok(None),
        Ok(value) => Ok(Some(PathBuf::from(value))),
        Err(_) => Ok(None),
    }
}

fn parse_env_csv_list(name: &str) -> Result<Vec<String>, AsmRunError> {
    match env::var(name) {
        Ok(value) => Ok(value
            .split(',')
            .map(str::trim)
            .filter(|item| !item.is_empty())
            .map(str::to_string)
            .collect()),
        Err(_) => Ok(Vec::new()),
    }
}

fn normalize_extension_list(
    extensions: &[String],
    defaults: &[&str],
    flag: &str,
) -> Result<Vec<String>, AsmRunError> {
    let mut out: Vec<String> = defaults.iter().map(|ext| ext.to_string()).collect();
    for ext in extensions {
        let trimmed = ext.trim().trim_start_matches('.');
        if trimmed.is_empty() || trimmed.contains(['/', '\\']) {
            return Err(cli_error(format!("Invalid {flag} extension: {ext}")));
        }
        let lowered = trimmed.to_ascii_lowercase();
        if !out.contains(&lowered) {
            out.push(lowered);
        }
    }
    Ok(out)
}

/// Resolve the final output path for an optional name against the output
/// base, adding the extension when the name omits one.
pub fn resolve_output_path(base: &str, name: Option<String>, extension: &str) -> Option<String> {
    let name = name?;
    if name.is_empty() {
        return Some(format!("{base}.{extension}"));
    }
    let mut path = PathBuf::from(&name);
    if path.extension().is_none() {
        path = PathBuf::from(format!("{name}.{extension}"));
    }
    Some(path.to_string_lossy().to_string())
}

/// Check an input path against the accepted extensions and derive its
/// output base name.
pub fn input_base_from_path(
    path: &Path,
    accepted_exts: &[String],
) -> Result<(String, String), AsmRunError> {
    let file_name = match path.file_name().and_then(|s| s.to_str()) {
        Some(name) => name,
        None => return Err(cli_error("Invalid input file name")),
    };

    let ext = path.extension().and_then(|s| s.to_str()).unwrap_or("");
    if !accepted_exts
        .iter()
        .any(|allowed| allowed.eq_ignore_ascii_case(ext))
    {
        let accepted = accepted_exts
            .iter()
            .map(|ext| format!(".{ext}"))
            .collect::<Vec<_>>()
            .join(", ");
        return Err(cli_error(format!(
            "Input file must use one of these source extensions: {accepted}"
        )));
    }
    if !path.is_file() {
        return Err(cli_error(format!(
            "Input source file not found: {}",
            path.display()
        )));
    }

    let source_name = path.to_string_lossy().to_string();
    let base = path
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or(file_name);
    Ok((source_name, base.to_string()))
}

pub fn validate_cli(cli: &Cli) -> Result<CliConfig, AsmRunError> {
    let env_quiet = parse_env_bool("MACROFORGE_QUIET")?;
    let env_no_warn = parse_env_bool("MACROFORGE_NO_WARN")?;
    let env_warn_error = parse_env_bool("MACROFORGE_WERROR")?;
    let env_error_file = parse_env_path("MACROFORGE_ERROR_FILE")?;
    let env_error_append = parse_env_bool("MACROFORGE_ERROR_APPEND")?;
    let env_no_error = parse_env_bool("MACROFORGE_NO_ERROR")?;
    let env_labels_file = parse_env_path("MACROFORGE_LABELS_FILE")?;
    let env_input_exts = parse_env_csv_list("MACROFORGE_INPUT_EXTS")?;

    let mut effective_exts = env_input_exts;
    effective_exts.extend(cli.input_exts.clone());
    let input_extensions = normalize_extension_list(&effective_exts, &["masm"], "--input-ext")?;

    let effective_quiet = if cli.quiet {
        true
    } else {
        env_quiet.unwrap_or(false)
    };

    let effective_no_warn = if cli.no_warn {
        true
    } else if cli.warn_error {
        false
    } else {
        env_no_warn.unwrap_or(false)
    };

    let effective_warn_error = if cli.warn_error {
        true
    } else if effective_no_warn {
        false
    } else {
        env_warn_error.unwrap_or(false)
    };

    let effective_error_file = if cli.error_file.is_some() {
        cli.error_file.clone()
    } else {
        env_error_file
    };

    let effective_error_append = if cli.error_append {
        true
    } else {
        env_error_append.unwrap_or(false)
    };

    let effective_no_error = if cli.no_error {
        true
    } else if cli.error_file.is_some() {
        false
    } else {
        env_no_error.unwrap_or(false)
    };

    let effective_labels_file = if cli.labels_file.is_some() {
        cli.labels_file.clone()
    } else {
        env_labels_file
    };

    let input_paths = if !cli.infiles.is_empty() {
        if !cli.positional_inputs.is_empty() {
            return Err(cli_error(
                "Do not mix positional input with -i/--infile; use one style",
            ));
        }
        cli.infiles.clone()
    } else if cli.positional_inputs.len() == 1 {
        cli.positional_inputs.clone()
    } else if cli.positional_inputs.len() > 1 {
        return Err(cli_error(
            "Multiple positional inputs are not supported; use repeatable -i/--infile",
        ));
    } else {
        return Err(cli_error("No input files specified. Use -i/--infile"));
    };

    if input_paths.len() > 1 {
        if cli.outfile.is_some() {
            return Err(cli_error(
                "-o/--outfile is not allowed with multiple inputs",
            ));
        }
        if effective_labels_file.is_some() {
            return Err(cli_error("--labels is not allowed with multiple inputs"));
        }
        if cli.expanded_file.is_some() {
            return Err(cli_error("--expanded is not allowed with multiple inputs"));
        }
    }

    Ok(CliConfig {
        input_paths,
        input_extensions,
        out_base: cli.outfile.clone(),
        labels_file: effective_labels_file,
        expanded_file: cli.expanded_file.clone(),
        quiet: effective_quiet,
        output_format: cli.format,
        diagnostics_sink: if effective_no_error {
            DiagnosticsSinkConfig::Disabled
        } else if let Some(path) = &effective_error_file {
            DiagnosticsSinkConfig::File {
                path: path.clone(),
                append: effective_error_append,
            }
        } else {
            DiagnosticsSinkConfig::Stderr
        },
        warning_policy: WarningPolicy {
            emit_warnings: !effective_no_warn,
            treat_warnings_as_errors: effective_warn_error,
        },
    })
}

/// Validated CLI configuration.
#[derive(Debug)]
pub struct CliConfig {
    pub input_paths: Vec<PathBuf>,
    pub input_extensions: Vec<String>,
    pub out_base: Option<String>,
    pub labels_file: Option<PathBuf>,
    pub expanded_file: Option<PathBuf>,
    pub quiet: bool,
    pub output_format: OutputFormat,
    pub diagnostics_sink: DiagnosticsSinkConfig,
    pub warning_policy: WarningPolicy,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;
    use std::ffi::OsString;
    use std::sync::{Mutex, OnceLock};

    fn with_env_vars(vars: &[(&str, Option<&str>)], test: impl FnOnce()) {
        static ENV_LOCK: OnceLock<Mutex<()>> = OnceLock::new();
        let _guard = ENV_LOCK
            .get_or_init(|| Mutex::new(()))
            .lock()
            .expect("lock env mutex");

        let saved: Vec<(String, Option<OsString>)> = vars
            .iter()
            .map(|(key, _)| (key.to_string(), env::var_os(key)))
            .collect();

        for (key, value) in vars {
            match value {
                Some(value) => {
                    // SAFETY: tests serialize env access via ENV_LOCK.
                    unsafe { env::set_var(key, value) }
                }
                None => {
                    // SAFETY: tests serialize env access via ENV_LOCK.
                    unsafe { env::remove_var(key) }
                }
            }
        }

        test();

        for (key, value) in saved {
            match value {
                Some(value) => {
                    // SAFETY: tests serialize env access via ENV_LOCK.
                    unsafe { env::set_var(&key, value) }
                }
                None => {
                    // SAFETY: tests serialize env access via ENV_LOCK.
                    unsafe { env::remove_var(&key) }
                }
            }
        }
    }

    fn clean_env(test: impl FnOnce()) {
        with_env_vars(
            &[
                ("MACROFORGE_QUIET", None),
                ("MACROFORGE_NO_WARN", None),
                ("MACROFORGE_WERROR", None),
                ("MACROFORGE_ERROR_FILE", None),
                ("MACROFORGE_ERROR_APPEND", None),
                ("MACROFORGE_NO_ERROR", None),
                ("MACROFORGE_LABELS_FILE", None),
                ("MACROFORGE_INPUT_EXTS", None),
            ],
            test,
        );
    }

    fn parse(args: &[&str]) -> Cli {
        let mut argv = vec!["macroforge"];
        argv.extend_from_slice(args);
        Cli::parse_from(argv)
    }

    #[test]
    fn no_input_is_a_cli_error() {
        clean_env(|| {
            let cli = parse(&[]);
            let err = validate_cli(&cli).expect_err("no input");
            assert!(err.to_string().contains("No input files"));
        });
    }

    #[test]
    fn positional_and_infile_must_not_mix() {
        clean_env(|| {
            let cli = parse(&["prog.masm", "-i", "other.masm"]);
            let err = validate_cli(&cli).expect_err("mixed input styles");
            assert!(err.to_string().contains("Do not mix"));
        });
    }

    #[test]
    fn multiple_inputs_reject_explicit_outfile() {
        clean_env(|| {
            let cli = parse(&["-i", "a.masm", "-i", "b.masm", "-o", "out"]);
            let err = validate_cli(&cli).expect_err("-o with multiple inputs");
            assert!(err.to_string().contains("--outfile"));
        });
    }

    #[test]
    fn error_file_selects_file_sink() {
        clean_env(|| {
            let cli = parse(&["prog.masm", "-E", "diag.log", "--error-append"]);
            let config = validate_cli(&cli).expect("valid cli");
            match config.diagnostics_sink {
                DiagnosticsSinkConfig::File { ref path, append } => {
                    assert_eq!(path, &PathBuf::from("diag.log"));
                    assert!(append);
                }
                _ => panic!("expected file sink"),
            }
        });
    }

    #[test]
    fn no_error_disables_the_sink() {
        clean_env(|| {
            let cli = parse(&["prog.masm", "--no-error"]);
            let config = validate_cli(&cli).expect("valid cli");
            assert!(matches!(
                config.diagnostics_sink,
                DiagnosticsSinkConfig::Disabled
            ));
        });
    }

    #[test]
    fn env_overlay_applies_when_flags_are_absent() {
        with_env_vars(
            &[
                ("MACROFORGE_QUIET", Some("1")),
                ("MACROFORGE_WERROR", Some("true")),
                ("MACROFORGE_NO_WARN", None),
                ("MACROFORGE_ERROR_FILE", None),
                ("MACROFORGE_ERROR_APPEND", None),
                ("MACROFORGE_NO_ERROR", None),
                ("MACROFORGE_LABELS_FILE", None),
                ("MACROFORGE_INPUT_EXTS", None),
            ],
            || {
                let cli = parse(&["prog.masm"]);
                let config = validate_cli(&cli).expect("valid cli");
                assert!(config.quiet);
                assert!(config.warning_policy.treat_warnings_as_errors);
            },
        );
    }

    #[test]
    fn cli_no_warn_beats_env_werror() {
        with_env_vars(
            &[
                ("MACROFORGE_WERROR", Some("1")),
                ("MACROFORGE_QUIET", None),
                ("MACROFORGE_NO_WARN", None),
                ("MACROFORGE_ERROR_FILE", None),
                ("MACROFORGE_ERROR_APPEND", None),
                ("MACROFORGE_NO_ERROR", None),
                ("MACROFORGE_LABELS_FILE", None),
                ("MACROFORGE_INPUT_EXTS", None),
            ],
            || {
                let cli = parse(&["prog.masm", "-w"]);
                let config = validate_cli(&cli).expect("valid cli");
                assert!(!config.warning_policy.emit_warnings);
                assert!(!config.warning_policy.treat_warnings_as_errors);
            },
        );
    }

    #[test]
    fn invalid_env_bool_is_reported() {
        with_env_vars(&[("MACROFORGE_QUIET", Some("maybe"))], || {
            let cli = parse(&["prog.masm"]);
            let err = validate_cli(&cli).expect_err("bad boolean");
            assert!(err.to_string().contains("MACROFORGE_QUIET"));
        });
    }

    #[test]
    fn resolve_output_path_adds_extension_when_missing() {
        assert_eq!(
            resolve_output_path("prog", Some(String::new()), "mfs"),
            Some("prog.mfs".to_string())
        );
        assert_eq!(
            resolve_output_path("prog", Some("custom".to_string()), "mfs"),
            Some("custom.mfs".to_string())
        );
        assert_eq!(
            resolve_output_path("prog", Some("custom.out".to_string()), "mfs"),
            Some("custom.out".to_string())
        );
        assert_eq!(resolve_output_path("prog", None, "mfs"), None);
    }

    #[test]
    fn input_extension_is_enforced() {
        let exts = vec!["masm".to_string()];
        let err =
            input_base_from_path(Path::new("prog.txt"), &exts).expect_err("wrong extension");
        assert!(err.to_string().contains(".masm"));
    }

    #[test]
    fn extension_list_keeps_defaults_and_dedupes() {
        let exts = normalize_extension_list(
            &["MASM".to_string(), ".s".to_string()],
            &["masm"],
            "--input-ext",
        )
        .expect("valid extensions");
        assert_eq!(exts, vec!["masm".to_string(), "s".to_string()]);
    }
}
