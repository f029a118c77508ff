//! Exit code logic for the hysetter process.
//!
//! Single responsibility: map the run verdict to the process exit outcome.

use hysetter_core::tasks::RunVerdict;

use crate::ProcessExit;

/// Determines the process exit outcome from the run verdict.
pub(crate) fn determine_exit_outcome(verdict: RunVerdict) -> ProcessExit {
    match verdict {
        RunVerdict::Success => ProcessExit::Success,
        RunVerdict::Partial => ProcessExit::Partial,
        RunVerdict::Failure => ProcessExit::Failure,
    }
}
