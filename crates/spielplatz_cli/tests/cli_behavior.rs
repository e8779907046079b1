//! Integration tests for CLI behavior
//!
//! These tests verify the external behavior of the CLI tool without a
//! real engine module.

use assert_cmd::Command;
use assert_fs::TempDir;
use assert_fs::prelude::*;
use predicates::prelude::*;

/// Helper to create a command for the spielplatz CLI
fn spielplatz_cmd() -> Command {
    Command::new(env!("CARGO_BIN_EXE_spielplatz"))
}

/// A minimal engine module: `analyze` reports nothing, `run` prints
/// `hi` through the host and exits with code 7.
const GREETING_ENGINE: &str = r##"
(module
    (import "extism:host/env" "alloc" (func $alloc (param i64) (result i64)))
    (import "extism:host/env" "store_u8" (func $store_u8 (param i64 i32)))
    (import "extism:host/env" "output_set" (func $output_set (param i64 i64)))
    (import "extism:host/user" "print" (func $print (param i64)))
    (memory (export "memory") 1)
    (data (i32.const 0) "{\"code\":7,\"diagnostics\":\"\"}")
    (data (i32.const 64) "[]")
    (data (i32.const 80) "hi")

    ;; Copies `len` bytes at `ptr` into a fresh host block.
    (func $copy (param $ptr i32) (param $len i32) (result i64)
        (local $offset i64)
        (local $i i32)
        (local.set $offset (call $alloc (i64.extend_i32_u (local.get $len))))
        (block $done
            (loop $next
                (br_if $done (i32.ge_u (local.get $i) (local.get $len)))
                (call $store_u8
                    (i64.add (local.get $offset) (i64.extend_i32_u (local.get $i)))
                    (i32.load8_u (i32.add (local.get $ptr) (local.get $i))))
                (local.set $i (i32.add (local.get $i) (i32.const 1)))
                (br $next)))
        (local.get $offset))

    (func $reply (param $ptr i32) (param $len i32) (result i32)
        (call $output_set
            (call $copy (local.get $ptr) (local.get $len))
            (i64.extend_i32_u (local.get $len)))
        (i32.const 0))

    (func (export "analyze") (result i32)
        (call $reply (i32.const 64) (i32.const 2)))

    (func (export "run") (result i32)
        (call $print (call $copy (i32.const 80) (i32.const 2)))
        (call $reply (i32.const 0) (i32.const 27)))
)
"##;

fn write_greeting_engine(temp: &TempDir) {
    let wasm = wat::parse_str(GREETING_ENGINE).expect("Invalid WAT");
    temp.child("engine.wasm").write_binary(&wasm).unwrap();
}

mod help_command {
    use super::*;

    #[test]
    fn shows_help_with_flag() {
        spielplatz_cmd()
            .arg("--help")
            .assert()
            .success()
            .stdout(predicate::str::contains("Usage:"))
            .stdout(predicate::str::contains("run"))
            .stdout(predicate::str::contains("worker").not());
    }

    #[test]
    fn shows_version_with_flag() {
        spielplatz_cmd()
            .arg("--version")
            .assert()
            .success()
            .stdout(predicate::str::contains(env!("CARGO_PKG_VERSION")));
    }
}

mod init_command {
    use super::*;

    #[test]
    fn creates_new_config_file() {
        let temp = TempDir::new().unwrap();

        spielplatz_cmd()
            .current_dir(temp.path())
            .arg("init")
            .assert()
            .success()
            .stderr(predicate::str::contains("Created .spielplatz.jsonc"));

        temp.child(".spielplatz.jsonc")
            .assert(predicate::str::contains("\"engine\""));
    }

    #[test]
    fn fails_when_config_exists_without_force() {
        let temp = TempDir::new().unwrap();
        temp.child(".spielplatz.jsonc").write_str("{}").unwrap();

        spielplatz_cmd()
            .current_dir(temp.path())
            .arg("init")
            .assert()
            .failure()
            .stderr(predicate::str::contains("already exists"));
    }

    #[test]
    fn overwrites_config_with_force() {
        let temp = TempDir::new().unwrap();
        temp.child(".spielplatz.jsonc").write_str("{}").unwrap();

        spielplatz_cmd()
            .current_dir(temp.path())
            .args(["init", "--force"])
            .assert()
            .success();

        temp.child(".spielplatz.jsonc")
            .assert(predicate::str::contains("memoryMaxPages"));
    }
}

mod engine_errors {
    use super::*;

    #[test]
    fn lint_without_engine_fails() {
        let temp = TempDir::new().unwrap();
        temp.child("main.sp").write_str("print 1").unwrap();

        spielplatz_cmd()
            .current_dir(temp.path())
            .args(["lint", "main.sp"])
            .assert()
            .code(2)
            .stderr(predicate::str::contains("No engine module configured"));
    }

    #[test]
    fn run_with_missing_engine_file_fails() {
        let temp = TempDir::new().unwrap();
        temp.child("main.sp").write_str("print 1").unwrap();

        spielplatz_cmd()
            .current_dir(temp.path())
            .args(["run", "main.sp", "--engine", "missing.wasm"])
            .assert()
            .code(2)
            .stderr(predicate::str::contains("Engine module not found"));
    }

    #[test]
    fn invalid_engine_module_fails_to_load() {
        let temp = TempDir::new().unwrap();
        temp.child("main.sp").write_str("print 1").unwrap();
        temp.child("engine.wasm").write_binary(b"not wasm").unwrap();

        spielplatz_cmd()
            .current_dir(temp.path())
            .args(["lint", "main.sp", "--engine", "engine.wasm"])
            .assert()
            .code(2)
            .stderr(predicate::str::contains("Failed to load engine"));
    }

    #[test]
    fn process_context_reports_worker_exit() {
        let temp = TempDir::new().unwrap();
        temp.child("main.sp").write_str("print 1").unwrap();
        temp.child("engine.wasm").write_binary(b"not wasm").unwrap();

        spielplatz_cmd()
            .current_dir(temp.path())
            .args(["run", "main.sp", "--engine", "engine.wasm", "--isolation", "process"])
            .assert()
            .code(2)
            .stderr(predicate::str::contains("Execution context closed"));
    }

    #[test]
    fn missing_source_file_fails() {
        let temp = TempDir::new().unwrap();

        spielplatz_cmd()
            .current_dir(temp.path())
            .args(["lint", "nope.sp"])
            .assert()
            .code(2)
            .stderr(predicate::str::contains("Failed to read nope.sp"));
    }
}

mod run_command {
    use super::*;

    #[test]
    fn runs_in_thread_context() {
        let temp = TempDir::new().unwrap();
        temp.child("main.sp").write_str("print hi").unwrap();
        write_greeting_engine(&temp);

        spielplatz_cmd()
            .current_dir(temp.path())
            .args(["run", "main.sp", "--engine", "engine.wasm"])
            .assert()
            .code(7)
            .stdout("hi");
    }

    #[test]
    fn runs_in_worker_process() {
        let temp = TempDir::new().unwrap();
        temp.child("main.sp").write_str("print hi").unwrap();
        write_greeting_engine(&temp);

        spielplatz_cmd()
            .current_dir(temp.path())
            .args(["run", "main.sp", "--engine", "engine.wasm", "--isolation", "process"])
            .assert()
            .code(7)
            .stdout("hi");
    }

    #[test]
    fn lint_reports_no_issues() {
        let temp = TempDir::new().unwrap();
        temp.child("main.sp").write_str("print hi").unwrap();
        write_greeting_engine(&temp);

        spielplatz_cmd()
            .current_dir(temp.path())
            .args(["lint", "main.sp", "--engine", "engine.wasm"])
            .assert()
            .success()
            .stdout(predicate::str::contains("Found 0 issues"));
    }
}

mod config_errors {
    use super::*;

    #[test]
    fn rejects_unknown_config_keys() {
        let temp = TempDir::new().unwrap();
        temp.child("main.sp").write_str("print 1").unwrap();
        temp.child(".spielplatz.jsonc")
            .write_str(r#"{ "engin": "engine.wasm" }"#)
            .unwrap();

        spielplatz_cmd()
            .current_dir(temp.path())
            .args(["lint", "main.sp"])
            .assert()
            .code(2)
            .stderr(predicate::str::contains("Config validation failed"));
    }

    #[test]
    fn explicit_config_path_is_used() {
        let temp = TempDir::new().unwrap();
        temp.child("main.sp").write_str("print 1").unwrap();
        temp.child("conf/custom.json")
            .write_str(r#"{ "engine": "engine.wasm" }"#)
            .unwrap();

        spielplatz_cmd()
            .current_dir(temp.path())
            .args(["lint", "main.sp", "--config", "conf/custom.json"])
            .assert()
            .code(2)
            .stderr(predicate::str::contains("engine.wasm"))
            .stderr(predicate::str::contains("Engine module not found"));
    }
}

mod worker_command {
    use super::*;

    #[test]
    fn requires_an_engine() {
        spielplatz_cmd()
            .arg("worker")
            .write_stdin("")
            .assert()
            .code(2)
            .stderr(predicate::str::contains("requires --engine"));
    }
}
