//! Subprocess layer for envpack.
//!
//! This crate runs the external tools the pipeline depends on: async streaming
//! subprocesses with timeouts and cancellation (`ProcessStream`,
//! `run_streaming`, `CancelToken`), the pluggable `PackagingBackend` trait with
//! a conda / conda-pack / hdfs / tar implementation and an in-memory mock, and
//! prerequisite checking.

pub mod backend;
pub mod cancel;
pub mod conda;
pub mod mock;
pub mod prereq;
pub mod process;

pub use backend::{select_backend, PackagingBackend, ProgressFn, ToolPaths};
pub use cancel::CancelToken;
pub use conda::CondaBackend;
pub use mock::{BackendCall, MockBackend};
pub use prereq::{check_packaging_prereqs, format_missing, MissingPrereq};
pub use process::{
    run_captured, run_streaming, OutputTail, ProcessEvent, ProcessStream, RunControl, ToolCommand,
    ToolOutput, OUTPUT_TAIL_LINES,
};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum RuntimeError {
    #[error("runtime I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("backend '{0}' is not available on this system")]
    BackendUnavailable(String),
    #[error("failed to start '{program}': {message}")]
    Spawn { program: String, message: String },
    #[error("'{program}' failed with {}{}", exit_label(.code.as_ref()), tail_suffix(.tail))]
    Subprocess {
        program: String,
        code: Option<i32>,
        tail: Vec<String>,
    },
    #[error("'{program}' timed out after {secs}s")]
    Timeout { program: String, secs: u64 },
    #[error("'{0}' was cancelled")]
    Cancelled(String),
    #[error("unexpected tool output: {0}")]
    Output(String),
}

fn exit_label(code: Option<&i32>) -> String {
    match code {
        Some(c) => format!("exit code {c}"),
        None => "a signal".to_owned(),
    }
}

fn tail_suffix(tail: &[String]) -> String {
    if tail.is_empty() {
        String::new()
    } else {
        format!(":\n{}", tail.join("\n"))
    }
}
