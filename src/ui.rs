// Terminal helpers for the CLI: spinners, the password prompt and
// human-readable rendering of compile and deployment failures.

use crate::compiler::CompileFailure;
use crate::modules::{Failure, FailureCode};
use anyhow::Result;
use crossterm::style::Stylize;
use dialoguer::Password;
use indicatif::{ProgressBar, ProgressStyle};
use std::fmt::Write as _;
use std::time::Duration;

/// Spinner shown while a blocking call runs. Call `finish_and_clear` when
/// done.
pub fn spinner(message: &str) -> Result<ProgressBar> {
    let spinner = ProgressBar::new_spinner();
    spinner.set_style(ProgressStyle::with_template("{spinner} {msg}")?);
    spinner.set_message(message.to_string());
    spinner.enable_steady_tick(Duration::from_millis(100));
    Ok(spinner)
}

/// Ask for the admin password without echoing it.
pub fn prompt_password(username: &str) -> Result<String> {
    let password = Password::new()
        .with_prompt(format!("Admin password for {username}"))
        .interact()?;
    Ok(password)
}

/// Per-file listing for compile errors, the raw compiler text otherwise.
pub fn render_compile_failure(failure: &CompileFailure) -> String {
    let mut out = String::new();
    match failure {
        CompileFailure::CompileError { invocation, files } => {
            for (file, entries) in files {
                let _ = writeln!(out, "{} {}", "Error in".bold(), file.as_str().on_red());
                for entry in entries {
                    let _ = writeln!(
                        out,
                        "{} {} {}",
                        format!("({}):", entry.line).bold(),
                        entry.code.as_str().cyan(),
                        entry.message
                    );
                }
            }
            let _ = writeln!(
                out,
                "Failed to compile {}!",
                invocation.input_file.display()
            );
        }
        CompileFailure::CompilerRunError {
            invocation,
            raw_output,
        } => {
            let _ = writeln!(
                out,
                "{} {}",
                "Failed to compile".bold(),
                invocation.input_file.display().to_string().on_red()
            );
            let _ = writeln!(out, "{}", raw_output.trim_end());
        }
        CompileFailure::OutputDir { .. } => {
            let _ = writeln!(out, "{}", failure.to_string().red());
        }
    }
    out
}

pub fn render_operation_failure(module: &str, failure: &Failure) -> String {
    let hint = match failure.code {
        FailureCode::SignedOut => "the session was dropped twice in a row; try again",
        FailureCode::LicenseLimit => "close other admin sessions on the store",
        FailureCode::FieldError => "the admin panel rejected a field value",
        FailureCode::UnknownUploadError => "see the logged response body",
    };
    format!(
        "{} {}: {}\n  {}",
        "Failed".bold(),
        module.on_red(),
        failure,
        hint
    )
}
