//! Error reporting policy shared by all commands.
//!
//! Domain modules define their own `thiserror` enums. Commands return
//! `anyhow::Result` and this module decides how a failure reaches the user:
//!
//! - errors wrapped with [`silence`] were already reported and are not
//!   printed again;
//! - errors that [`is_expected`] are printed as a single line;
//! - everything else is printed with its full cause chain.

use std::fmt;

use crate::api::ApiError;
use crate::bundler::BundleError;
use crate::config::ConfigError;
use crate::container::ImageError;
use crate::executor::ExecuteError;
use crate::monitor::MonitorError;
use crate::util::tools::DependencyError;

/// Marker for an error that has already been shown to the user.
#[derive(Debug)]
pub struct SilentError {
    inner: anyhow::Error,
}

impl SilentError {
    pub fn inner(&self) -> &anyhow::Error {
        &self.inner
    }
}

impl fmt::Display for SilentError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.inner)
    }
}

impl std::error::Error for SilentError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.inner.source()
    }
}

/// Report `err` once and mark it so outer layers stay quiet.
pub fn silence(err: impl Into<anyhow::Error>) -> anyhow::Error {
    let err = err.into();
    if is_silent(&err) {
        return err;
    }
    tracing::error!("{err}");
    mark_reported(err)
}

/// Mark an error that was logged where it was detected.
pub fn mark_reported(err: impl Into<anyhow::Error>) -> anyhow::Error {
    let err = err.into();
    if is_silent(&err) {
        return err;
    }
    anyhow::Error::new(SilentError { inner: err })
}

/// Whether `err` (or anything in its chain) carries the silent marker.
pub fn is_silent(err: &anyhow::Error) -> bool {
    err.chain().any(|cause| cause.is::<SilentError>())
}

/// Expected failures are caused by the user's environment or input, not by
/// a bug, and are reported without a cause chain.
pub fn is_expected(err: &anyhow::Error) -> bool {
    err.chain().any(|cause| {
        if let Some(e) = cause.downcast_ref::<BundleError>() {
            return e.is_expected();
        }
        if let Some(e) = cause.downcast_ref::<ExecuteError>() {
            return e.is_expected();
        }
        if let Some(e) = cause.downcast_ref::<ImageError>() {
            return matches!(e, ImageError::InvalidBundle(_));
        }
        cause.is::<ApiError>()
            || cause.is::<MonitorError>()
            || cause.is::<DependencyError>()
            || cause.is::<ConfigError>()
    })
}

/// How `main` should surface a failed command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Report {
    /// Already reported, exit quietly.
    Quiet,
    /// One-line message.
    Concise,
    /// Full chain for debugging.
    Full,
}

pub fn classify(err: &anyhow::Error) -> Report {
    if is_silent(err) {
        Report::Quiet
    } else if is_expected(err) {
        Report::Concise
    } else {
        Report::Full
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executor::ExecuteError;

    #[test]
    fn silenced_errors_are_quiet() {
        let err = silence(anyhow::anyhow!("build exploded"));
        assert_eq!(classify(&err), Report::Quiet);
        assert_eq!(err.to_string(), "build exploded");
    }

    #[test]
    fn silencing_twice_keeps_one_marker() {
        let err = silence(silence(anyhow::anyhow!("once")));
        let markers = err.chain().filter(|c| c.is::<SilentError>()).count();
        assert_eq!(markers, 1);
    }

    #[test]
    fn context_does_not_hide_marker() {
        let err = silence(anyhow::anyhow!("inner")).context("while bundling");
        assert!(is_silent(&err));
    }

    #[test]
    fn unknown_fuzzer_is_expected() {
        let err = anyhow::Error::new(ExecuteError::UnknownFuzzer("nope".into()));
        assert_eq!(classify(&err), Report::Concise);
    }

    #[test]
    fn plain_io_error_gets_full_report() {
        let err = anyhow::Error::new(std::io::Error::other("disk on fire"));
        assert_eq!(classify(&err), Report::Full);
    }
}
