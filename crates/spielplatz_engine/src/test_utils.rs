//! Test utilities for spielplatz_engine.
//!
//! [`ScriptEngine`] is a small deterministic engine that speaks the real
//! JSON reply schemas. It understands one statement per line or per `;`:
//!
//! | Statement       | Effect                                              |
//! |-----------------|-----------------------------------------------------|
//! | `print X`       | emits `X` (or the value bound to `X`)               |
//! | `println X`     | emits `X` followed by a newline                     |
//! | `let NAME = X`  | binds `NAME`                                        |
//! | `exit N`        | stops with exit code `N`                            |
//! | `sleep N`       | sleeps `N` milliseconds                             |
//! | `divide A B`    | runtime `arithmetic` error when `B` is zero         |
//! | `recurse`       | recurses until the depth limit (`stackOverflow`)    |
//! | `loop`          | spins until interrupted                             |
//! | `panic`         | the engine call itself fails                        |
//! | `garbage`       | the engine replies with malformed JSON              |
//!
//! Execution backends are `vm` and `tree`; the only compile backend is
//! `listing`.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use spielplatz_diagnostics::{
    CompileResult, Diagnostic, DiagnosticLevel, ErrorKind, Location, Markup, RunResult,
    RuntimeError, RuntimeErrorKind, Span,
};

use crate::{EngineError, EngineLoader, EngineModule, InterruptHandle, OutputSink};

/// Call depth at which `recurse` overflows.
pub const MAX_CALL_DEPTH: usize = 256;

const RUN_BACKENDS: &[&str] = &["vm", "tree"];
const COMPILE_BACKEND: &str = "listing";
const MALFORMED_REPLY: &str = r#"{"code": "#;

/// Loader for [`ScriptEngine`] instances.
#[derive(Debug, Default)]
pub struct ScriptEngineLoader {
    loads: AtomicUsize,
    load_delay: Option<Duration>,
}

impl ScriptEngineLoader {
    /// Creates a loader that loads instantly.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a loader whose `load` takes `delay`.
    pub fn with_load_delay(delay: Duration) -> Self {
        Self {
            loads: AtomicUsize::new(0),
            load_delay: Some(delay),
        }
    }

    /// Number of engines loaded so far.
    pub fn load_count(&self) -> usize {
        self.loads.load(Ordering::SeqCst)
    }
}

impl EngineLoader for ScriptEngineLoader {
    fn load(&self) -> Result<Box<dyn EngineModule>, EngineError> {
        if let Some(delay) = self.load_delay {
            std::thread::sleep(delay);
        }
        self.loads.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(ScriptEngine::new()))
    }

    fn describe(&self) -> String {
        "script engine".to_string()
    }
}

/// Loader that always fails.
#[derive(Debug)]
pub struct FailingLoader {
    message: String,
}

impl FailingLoader {
    /// Creates a loader failing with `message`.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

impl EngineLoader for FailingLoader {
    fn load(&self) -> Result<Box<dyn EngineModule>, EngineError> {
        Err(EngineError::load(self.message.clone()))
    }

    fn describe(&self) -> String {
        "failing loader".to_string()
    }
}

/// A scripted engine for tests.
#[derive(Debug, Default)]
pub struct ScriptEngine {
    interrupted: Arc<AtomicBool>,
}

impl ScriptEngine {
    /// Creates a new engine.
    pub fn new() -> Self {
        Self::default()
    }

    fn check_interrupt(&self) -> Result<(), EngineError> {
        if self.interrupted.load(Ordering::SeqCst) {
            return Err(EngineError::Interrupted);
        }
        Ok(())
    }
}

impl EngineModule for ScriptEngine {
    fn name(&self) -> &str {
        "script"
    }

    fn analyze(&mut self, code: &str) -> Result<String, EngineError> {
        let program = Program::parse(code);
        if program.garbage {
            return Ok(MALFORMED_REPLY.to_string());
        }
        to_json("analyze", &program.diagnostics)
    }

    fn run(
        &mut self,
        code: &str,
        backend: &str,
        mut sink: Box<dyn OutputSink>,
    ) -> Result<String, EngineError> {
        if !RUN_BACKENDS.contains(&backend) {
            return Err(EngineError::call("run", format!("unknown backend `{backend}`")));
        }
        self.interrupted.store(false, Ordering::SeqCst);

        let program = Program::parse(code);
        if program.garbage {
            return Ok(MALFORMED_REPLY.to_string());
        }
        let markup = program.markup();
        if program.has_errors() {
            return to_json("run", &RunResult::rejected(markup));
        }

        let mut bindings: HashMap<&str, &str> = HashMap::new();
        let mut exit_code = 0;

        for op in &program.ops {
            self.check_interrupt()?;
            match op {
                Op::Print(value) => sink.emit(lookup(&bindings, value)),
                Op::PrintLine(value) => {
                    let value = lookup(&bindings, value);
                    sink.emit(&format!("{value}\n"));
                }
                Op::Let(name, value) => {
                    bindings.insert(name.as_str(), value.as_str());
                }
                Op::Exit(code) => {
                    exit_code = *code;
                    break;
                }
                Op::Sleep(ms) => {
                    let deadline = std::time::Instant::now() + Duration::from_millis(*ms);
                    while std::time::Instant::now() < deadline {
                        self.check_interrupt()?;
                        std::thread::sleep(Duration::from_millis(1));
                    }
                }
                Op::Divide(_, 0) => {
                    let error = RuntimeError::new(RuntimeErrorKind::Arithmetic, "division by zero");
                    return to_json("run", &RunResult::aborted(error, markup));
                }
                Op::Divide(..) => {}
                Op::Recurse => {
                    if let Err(depth) = descend(0) {
                        let error = RuntimeError::new(
                            RuntimeErrorKind::StackOverflow,
                            format!("maximum call depth of {depth} exceeded"),
                        );
                        return to_json("run", &RunResult::aborted(error, markup));
                    }
                }
                Op::Loop => loop {
                    self.check_interrupt()?;
                    std::thread::sleep(Duration::from_millis(1));
                },
                Op::Panic => {
                    return Err(EngineError::call("run", "unreachable instruction executed"));
                }
            }
        }

        to_json("run", &RunResult::exited(exit_code, markup))
    }

    fn compile(&mut self, code: &str, backend: &str) -> Result<String, EngineError> {
        if backend != COMPILE_BACKEND {
            return to_json(
                "compile",
                &CompileResult {
                    failed: true,
                    diagnostics: Markup::default(),
                    output: String::new(),
                    error: format!("unknown compile backend `{backend}`"),
                },
            );
        }

        let program = Program::parse(code);
        if program.garbage {
            return Ok(MALFORMED_REPLY.to_string());
        }
        let failed = program.has_errors();
        let output = if failed {
            String::new()
        } else {
            program
                .ops
                .iter()
                .enumerate()
                .map(|(index, op)| format!("{index:04} {}\n", op.listing()))
                .collect()
        };

        to_json(
            "compile",
            &CompileResult {
                failed,
                diagnostics: program.markup(),
                output,
                error: String::new(),
            },
        )
    }

    fn interrupt_handle(&self) -> Option<InterruptHandle> {
        let flag = Arc::clone(&self.interrupted);
        Some(InterruptHandle::new(move || flag.store(true, Ordering::SeqCst)))
    }
}

fn lookup<'a>(bindings: &HashMap<&'a str, &'a str>, value: &'a str) -> &'a str {
    bindings.get(value).copied().unwrap_or(value)
}

fn to_json<T: serde::Serialize>(entry: &'static str, value: &T) -> Result<String, EngineError> {
    serde_json::to_string(value).map_err(|e| EngineError::call(entry, e.to_string()))
}

/// Recurses until the depth limit and reports the depth reached.
fn descend(depth: usize) -> Result<(), usize> {
    if depth >= MAX_CALL_DEPTH {
        return Err(depth);
    }
    descend(std::hint::black_box(depth + 1))
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Op {
    Print(String),
    PrintLine(String),
    Let(String, String),
    Exit(i64),
    Sleep(u64),
    Divide(i64, i64),
    Recurse,
    Loop,
    Panic,
}

impl Op {
    fn listing(&self) -> String {
        match self {
            Op::Print(value) => format!("PRINT {value}"),
            Op::PrintLine(value) => format!("PRINTLN {value}"),
            Op::Let(name, value) => format!("STORE {name} {value}"),
            Op::Exit(code) => format!("EXIT {code}"),
            Op::Sleep(ms) => format!("SLEEP {ms}"),
            Op::Divide(a, b) => format!("DIV {a} {b}"),
            Op::Recurse => "CALL self".to_string(),
            Op::Loop => "JMP 0".to_string(),
            Op::Panic => "TRAP".to_string(),
        }
    }
}

/// A parsed script with its findings.
#[derive(Debug, Default)]
struct Program {
    ops: Vec<Op>,
    diagnostics: Vec<Diagnostic>,
    garbage: bool,
}

impl Program {
    fn parse(code: &str) -> Self {
        let mut program = Program::default();
        for statement in split_statements(code) {
            program.check(&statement);
        }
        program
    }

    fn has_errors(&self) -> bool {
        self.diagnostics.iter().any(Diagnostic::is_error)
    }

    fn markup(&self) -> Markup {
        let rendered: Vec<String> = self
            .diagnostics
            .iter()
            .map(|d| {
                let start = d.span.start();
                format!(
                    "<b>{}</b> {}:{}: {}",
                    level_name(d.level),
                    start.line,
                    start.column,
                    d.message
                )
            })
            .collect();
        Markup::new(rendered.join("<br>"))
    }

    fn check(&mut self, statement: &Statement) {
        let (keyword, rest) = match statement.text.split_once(char::is_whitespace) {
            Some((keyword, rest)) => (keyword, rest.trim()),
            None => (statement.text.as_str(), ""),
        };

        let op = match keyword {
            "print" | "println" => {
                if rest.is_empty() {
                    self.diagnostics.push(Diagnostic::new(
                        DiagnosticLevel::Hint,
                        format!("`{keyword}` without a value prints nothing"),
                        statement.span,
                    ));
                }
                if keyword == "print" {
                    Op::Print(rest.to_string())
                } else {
                    Op::PrintLine(rest.to_string())
                }
            }
            "let" => match self.check_let(rest, statement) {
                Some(op) => op,
                None => return,
            },
            "exit" => match rest.parse() {
                Ok(code) => Op::Exit(code),
                Err(_) => return self.type_error("exit code must be an integer", statement),
            },
            "sleep" => match rest.parse() {
                Ok(ms) => Op::Sleep(ms),
                Err(_) => return self.type_error("sleep duration must be a whole number", statement),
            },
            "divide" => {
                let operands: Vec<Option<i64>> =
                    rest.split_whitespace().map(|n| n.parse().ok()).collect();
                match operands.as_slice() {
                    [Some(a), Some(b)] => Op::Divide(*a, *b),
                    _ => return self.type_error("`divide` takes two integers", statement),
                }
            }
            "recurse" => Op::Recurse,
            "loop" => Op::Loop,
            "panic" => Op::Panic,
            "garbage" => {
                self.garbage = true;
                return;
            }
            unknown => {
                self.diagnostics.push(Diagnostic::error(
                    ErrorKind::Reference,
                    format!("unknown name `{unknown}`"),
                    statement.span,
                ));
                return;
            }
        };
        self.ops.push(op);
    }

    fn check_let(&mut self, rest: &str, statement: &Statement) -> Option<Op> {
        let Some((name, value)) = rest.split_once('=') else {
            self.syntax_error("expected `=` after binding name", statement.span);
            return None;
        };
        let name = name.trim();
        let value = value.trim();

        let valid_name = name
            .chars()
            .next()
            .is_some_and(|c| c.is_alphabetic() || c == '_')
            && name.chars().all(|c| c.is_alphanumeric() || c == '_');
        if !valid_name {
            self.syntax_error("expected identifier after `let`", statement.span);
            return None;
        }
        if value.is_empty() {
            self.syntax_error("expected expression after `=`", Span::point(statement.span.end()));
            return None;
        }
        Some(Op::Let(name.to_string(), value.to_string()))
    }

    fn syntax_error(&mut self, message: &str, span: Span) {
        self.diagnostics
            .push(Diagnostic::error(ErrorKind::Syntax, message, span));
    }

    fn type_error(&mut self, message: &str, statement: &Statement) {
        self.diagnostics
            .push(Diagnostic::error(ErrorKind::Type, message, statement.span));
    }
}

fn level_name(level: DiagnosticLevel) -> &'static str {
    match level {
        DiagnosticLevel::Hint => "hint",
        DiagnosticLevel::Info => "info",
        DiagnosticLevel::Warning => "warning",
        DiagnosticLevel::Error => "error",
    }
}

#[derive(Debug)]
struct Statement {
    text: String,
    span: Span,
}

/// Splits source text on `;` and newlines, trimming each statement and
/// recording where it sits in the source.
fn split_statements(code: &str) -> Vec<Statement> {
    let chars: Vec<char> = code.chars().collect();

    let mut locations = Vec::with_capacity(chars.len() + 1);
    let (mut line, mut column) = (1u32, 0u32);
    for (index, c) in chars.iter().enumerate() {
        locations.push(Location::new(line, column, index as u32));
        if *c == '\n' {
            line += 1;
            column = 0;
        } else {
            column += 1;
        }
    }
    locations.push(Location::new(line, column, chars.len() as u32));

    let mut statements = Vec::new();
    let mut segment_start = 0;
    for index in 0..=chars.len() {
        let at_boundary = index == chars.len() || matches!(chars[index], ';' | '\n');
        if !at_boundary {
            continue;
        }

        let mut start = segment_start;
        let mut end = index;
        while start < end && chars[start].is_whitespace() {
            start += 1;
        }
        while end > start && chars[end - 1].is_whitespace() {
            end -= 1;
        }
        if start < end {
            let (from, to) = (locations[start], locations[end]);
            statements.push(Statement {
                text: chars[start..end].iter().collect(),
                span: Span::new(from, to).unwrap_or(Span::point(from)),
            });
        }
        segment_start = index + 1;
    }
    statements
}
