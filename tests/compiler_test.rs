//! Integration tests for the compiler wrapper, using small shell scripts in
//! place of `mvc`.
#![cfg(unix)]

use miva_deploy::log::Level;
use miva_deploy::{CompileFailure, Compiler, CompilerInvocation, Logger};
use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tempfile::TempDir;

// Writing and exec'ing scripts from parallel tests can hit ETXTBSY.
static SERIAL: Mutex<()> = Mutex::new(());

fn fake_compiler(dir: &Path, body: &str) -> PathBuf {
    let path = dir.join("fake-mvc");
    fs::write(&path, format!("#!/bin/sh\n{body}\n")).unwrap();
    fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).unwrap();
    path
}

#[test]
fn successful_compile_creates_output_dir_and_passes_arguments() {
    let _guard = SERIAL.lock().unwrap_or_else(|e| e.into_inner());
    let temp = TempDir::new().unwrap();
    let program = fake_compiler(
        temp.path(),
        "echo \"$@\" > args.txt\necho compiled ok",
    );

    let invocation = CompilerInvocation::new("src/mod.mv", "build/out/mod.mvc")
        .builtins_dir("builtins")
        .define("DEBUG")
        .working_dir(temp.path());
    let result = Compiler::new(&Logger::new("test"))
        .with_program(&program)
        .compile(&invocation)
        .unwrap();

    assert!(temp.path().join("build/out").is_dir());
    assert_eq!(result.output_path, temp.path().join("build/out/mod.mvc"));
    assert_eq!(result.stdout.trim(), "compiled ok");
    let args = fs::read_to_string(temp.path().join("args.txt")).unwrap();
    assert_eq!(args.trim(), "-D DEBUG -o build/out/mod.mvc -B builtins src/mod.mv");
}

#[test]
fn diagnostics_become_compile_error() {
    let _guard = SERIAL.lock().unwrap_or_else(|e| e.into_inner());
    let temp = TempDir::new().unwrap();
    let program = fake_compiler(
        temp.path(),
        "echo 'foo.mv:12: E001: unexpected token'\n\
         echo 'foo.mv:15: E002: missing semicolon'\n\
         echo 'bar.mv:3: W010: unused variable'\n\
         exit 1",
    );

    let root = Logger::new("test");
    let events = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&events);
    let _sub = root.add_listener(move |origin, event| {
        sink.lock().unwrap().push((origin.to_string(), event.clone()));
    });

    let invocation = CompilerInvocation::new("foo.mv", "foo.mvc").working_dir(temp.path());
    let failure = Compiler::new(&root)
        .with_program(&program)
        .compile(&invocation)
        .unwrap_err();

    match failure {
        CompileFailure::CompileError { files, invocation: inv } => {
            assert_eq!(inv.input_file, PathBuf::from("foo.mv"));
            assert_eq!(files.len(), 2);
            assert_eq!(files["foo.mv"].len(), 2);
            assert_eq!(files["foo.mv"][1].line, 15);
            assert_eq!(files["bar.mv"][0].code, "W010");
        }
        other => panic!("expected CompileError, got {other:?}"),
    }

    let events = events.lock().unwrap();
    let (origin, error) = events
        .iter()
        .find(|(_, e)| e.level == Level::Error)
        .expect("an error event");
    assert_eq!(origin, "test: MivaCompiler");
    assert_eq!(error.context.as_ref().unwrap()["kind"], "CompileError");
}

#[test]
fn empty_output_is_a_run_error() {
    let _guard = SERIAL.lock().unwrap_or_else(|e| e.into_inner());
    let temp = TempDir::new().unwrap();
    let program = fake_compiler(temp.path(), "exit 3");

    let invocation = CompilerInvocation::new("a.mv", "a.mvc").working_dir(temp.path());
    let failure = Compiler::new(&Logger::new("test"))
        .with_program(&program)
        .compile(&invocation)
        .unwrap_err();

    match failure {
        CompileFailure::CompilerRunError { raw_output, .. } => {
            assert!(raw_output.contains("exit"), "{raw_output}");
        }
        other => panic!("expected CompilerRunError, got {other:?}"),
    }
}

#[test]
fn unstructured_output_is_kept_as_raw_text() {
    let _guard = SERIAL.lock().unwrap_or_else(|e| e.into_inner());
    let temp = TempDir::new().unwrap();
    let program = fake_compiler(temp.path(), "echo 'fatal: bad flag -Q'\nexit 2");

    let invocation = CompilerInvocation::new("a.mv", "a.mvc").working_dir(temp.path());
    let failure = Compiler::new(&Logger::new("test"))
        .with_program(&program)
        .compile(&invocation)
        .unwrap_err();

    assert!(matches!(
        failure,
        CompileFailure::CompilerRunError { ref raw_output, .. } if raw_output.contains("bad flag")
    ));
}

#[test]
fn missing_compiler_is_a_run_error() {
    let temp = TempDir::new().unwrap();
    let invocation = CompilerInvocation::new("a.mv", "a.mvc").working_dir(temp.path());
    let failure = Compiler::new(&Logger::new("test"))
        .with_program(temp.path().join("no-such-mvc"))
        .compile(&invocation)
        .unwrap_err();

    assert!(matches!(failure, CompileFailure::CompilerRunError { .. }));
}
