//! CLI entry point for hysetter.

use std::process::ExitCode;

mod app;
mod cli;

/// Process exit outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ProcessExit {
    /// Every category succeeded, or there was nothing to do.
    Success = 0,
    /// Fatal error: invalid config, AOI unavailable or every category failed.
    Failure = 1,
    /// Some categories or per-geometry items failed.
    Partial = 2,
}

impl From<ProcessExit> for ExitCode {
    fn from(exit: ProcessExit) -> Self {
        ExitCode::from(exit as u8)
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    match app::runtime::run().await {
        Ok(exit) => exit.into(),
        Err(error) => {
            eprintln!("Error: {error:#}");
            ProcessExit::Failure.into()
        }
    }
}
