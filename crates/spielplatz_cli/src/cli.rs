//! CLI argument definitions

use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};
use spielplatz_bridge::Isolation;

/// Spielplatz - run, lint and compile playground programs
#[derive(Parser)]
#[command(name = "spielplatz")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Configuration file path
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Engine WASM module (overrides the configuration)
    #[arg(short, long, global = true)]
    pub engine: Option<PathBuf>,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Report diagnostics for a program
    Lint {
        /// Source file
        file: PathBuf,

        /// Output format
        #[arg(short, long, value_enum, default_value_t = OutputFormat::Text)]
        format: OutputFormat,
    },

    /// Run a program
    Run {
        /// Source file
        file: PathBuf,

        /// Execution backend (defaults to the configured one)
        #[arg(short, long)]
        backend: Option<String>,

        /// Terminate the program after this many milliseconds
        #[arg(long, value_name = "MS")]
        timeout_ms: Option<u64>,

        /// How to isolate the program from this process
        #[arg(long, value_enum)]
        isolation: Option<IsolationArg>,
    },

    /// Compile a program with a compiling backend
    Compile {
        /// Source file
        file: PathBuf,

        /// Compiling backend
        #[arg(short, long, default_value = "listing")]
        backend: String,

        /// Write the output to a file instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Initialize configuration
    Init {
        /// Force overwrite existing config
        #[arg(long)]
        force: bool,
    },

    /// Host one execution context over stdin/stdout
    #[command(hide = true)]
    Worker {
        /// Memory limit in 64 KiB pages
        #[arg(long)]
        memory_max_pages: Option<u32>,

        /// Engine-side call timeout
        #[arg(long, value_name = "MS")]
        engine_timeout_ms: Option<u64>,
    },
}

/// Diagnostic output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}

/// Isolation flavour selectable on the command line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum IsolationArg {
    Thread,
    Process,
}

impl From<IsolationArg> for Isolation {
    fn from(arg: IsolationArg) -> Self {
        match arg {
            IsolationArg::Thread => Isolation::Thread,
            IsolationArg::Process => Isolation::Process,
        }
    }
}
