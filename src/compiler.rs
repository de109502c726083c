// Wrapper around the external Miva Script compiler (`mvc`).

use crate::diagnostics::{entry_count, parse_diagnostics, CompileFileMap};
use crate::log::{Level, Logger};
use std::path::{Path, PathBuf};
use std::process::Command;

pub const DEFAULT_COMPILER: &str = "mvc";

/// One compiler run. Relative paths are relative to `working_dir`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompilerInvocation {
    pub input_file: PathBuf,
    pub output_file: PathBuf,
    pub builtins_dir: Option<PathBuf>,
    pub working_dir: Option<PathBuf>,
    pub defines: Vec<String>,
}

impl CompilerInvocation {
    pub fn new(input_file: impl Into<PathBuf>, output_file: impl Into<PathBuf>) -> Self {
        CompilerInvocation {
            input_file: input_file.into(),
            output_file: output_file.into(),
            builtins_dir: None,
            working_dir: None,
            defines: Vec::new(),
        }
    }

    pub fn builtins_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.builtins_dir = Some(dir.into());
        self
    }

    pub fn working_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_dir = Some(dir.into());
        self
    }

    pub fn define(mut self, symbol: impl Into<String>) -> Self {
        self.defines.push(symbol.into());
        self
    }

    /// `[-D <symbol>]* -o <output> [-B <builtins>] <input>`
    pub fn arguments(&self) -> Vec<String> {
        let mut args = Vec::new();
        for symbol in &self.defines {
            args.push("-D".to_string());
            args.push(symbol.clone());
        }
        args.push("-o".to_string());
        args.push(self.output_file.display().to_string());
        if let Some(dir) = &self.builtins_dir {
            args.push("-B".to_string());
            args.push(dir.display().to_string());
        }
        args.push(self.input_file.display().to_string());
        args
    }

    fn cwd(&self) -> &Path {
        self.working_dir.as_deref().unwrap_or(Path::new("."))
    }
}

/// Why a compile did not produce output.
#[derive(Debug, thiserror::Error)]
pub enum CompileFailure {
    /// The compiler ran and rejected the input.
    #[error(
        "could not compile {}: {} error(s)",
        invocation.input_file.display(),
        entry_count(files)
    )]
    CompileError {
        invocation: CompilerInvocation,
        files: CompileFileMap,
    },

    /// The compiler did not run, or failed without diagnostics.
    #[error("could not compile {}: {raw_output}", invocation.input_file.display())]
    CompilerRunError {
        invocation: CompilerInvocation,
        raw_output: String,
    },

    #[error("could not create output directory {}: {source}", path.display())]
    OutputDir {
        path: PathBuf,
        source: std::io::Error,
    },
}

impl CompileFailure {
    fn context(&self) -> serde_json::Value {
        match self {
            CompileFailure::CompileError { invocation, files } => serde_json::json!({
                "kind": "CompileError",
                "input": invocation.input_file.display().to_string(),
                "files": files,
            }),
            CompileFailure::CompilerRunError {
                invocation,
                raw_output,
            } => serde_json::json!({
                "kind": "CompilerRunError",
                "input": invocation.input_file.display().to_string(),
                "message": raw_output,
            }),
            CompileFailure::OutputDir { path, source } => serde_json::json!({
                "kind": "OutputDir",
                "path": path.display().to_string(),
                "message": source.to_string(),
            }),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompileOutput {
    pub output_path: PathBuf,
    pub stdout: String,
}

pub struct Compiler {
    program: PathBuf,
    logger: Logger,
}

impl Compiler {
    pub fn new(logger: &Logger) -> Self {
        Compiler {
            program: PathBuf::from(DEFAULT_COMPILER),
            logger: logger.child("MivaCompiler"),
        }
    }

    pub fn with_program(mut self, program: impl Into<PathBuf>) -> Self {
        self.program = program.into();
        self
    }

    pub fn compile(
        &self,
        invocation: &CompilerInvocation,
    ) -> Result<CompileOutput, CompileFailure> {
        let result = self.run(invocation);
        if let Err(failure) = &result {
            self.logger.log_with(
                Level::Error,
                format!("Could not compile {}!", invocation.input_file.display()),
                Some(failure.context()),
            );
        }
        result
    }

    fn run(&self, invocation: &CompilerInvocation) -> Result<CompileOutput, CompileFailure> {
        let cwd = invocation.cwd();
        let output_path = cwd.join(&invocation.output_file);
        if let Some(dir) = output_path.parent() {
            self.logger
                .info(format!("Creating directory {}...", dir.display()));
            std::fs::create_dir_all(dir).map_err(|source| CompileFailure::OutputDir {
                path: dir.to_path_buf(),
                source,
            })?;
        }

        let args = invocation.arguments();
        self.logger.info(format!(
            "Running \"{} {}\" in \"{}\"...",
            self.program.display(),
            args.join(" "),
            cwd.display()
        ));

        let output = Command::new(&self.program)
            .args(&args)
            .current_dir(cwd)
            .output()
            .map_err(|e| CompileFailure::CompilerRunError {
                invocation: invocation.clone(),
                raw_output: format!("failed to run {}: {e}", self.program.display()),
            })?;

        let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
        if output.status.success() {
            if !stdout.trim().is_empty() {
                self.logger.info(stdout.trim_end());
            }
            return Ok(CompileOutput {
                output_path,
                stdout,
            });
        }

        let files = parse_diagnostics(&stdout);
        if !files.is_empty() {
            return Err(CompileFailure::CompileError {
                invocation: invocation.clone(),
                files,
            });
        }

        let stderr = String::from_utf8_lossy(&output.stderr);
        let raw_output = if !stdout.trim().is_empty() {
            stdout
        } else if !stderr.trim().is_empty() {
            stderr.into_owned()
        } else {
            format!("{} exited with {}", self.program.display(), output.status)
        };
        Err(CompileFailure::CompilerRunError {
            invocation: invocation.clone(),
            raw_output,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn arguments_follow_cli_shape() {
        let invocation = CompilerInvocation::new("src/mod.mv", "build/mod.mvc")
            .builtins_dir("builtins")
            .define("DEBUG")
            .define("STORE=2");

        assert_eq!(
            invocation.arguments(),
            [
                "-D", "DEBUG", "-D", "STORE=2", "-o", "build/mod.mvc", "-B", "builtins",
                "src/mod.mv"
            ]
        );
    }

    #[test]
    fn minimal_arguments() {
        let invocation = CompilerInvocation::new("a.mv", "a.mvc");
        assert_eq!(invocation.arguments(), ["-o", "a.mvc", "a.mv"]);
    }

    #[test]
    fn compile_error_display_counts_entries() {
        let files = parse_diagnostics("a.mv:1: E1: x\na.mv:2: E2: y\n");
        let failure = CompileFailure::CompileError {
            invocation: CompilerInvocation::new("a.mv", "a.mvc"),
            files,
        };
        assert_eq!(failure.to_string(), "could not compile a.mv: 2 error(s)");
    }
}
