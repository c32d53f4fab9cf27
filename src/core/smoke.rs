//! Smoke-test harness
//!
//! Runs a formula's declared test command against the installed prefix and
//! adjudicates pass/fail. The harness is a small state machine:
//! `NotRun -> Running -> {Passed, Failed, Errored}`. `Errored` means the
//! test itself could not run (missing binary, permissions, timeout), which
//! is distinct from the artifact misbehaving.

use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::core::builder::run_captured;
use crate::core::formula::TestSpec;

/// Harness state. Terminal states carry their diagnostics.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SmokeStatus {
    NotRun,
    Running,
    Passed,
    Failed {
        expected_exit: i32,
        actual_exit: i32,
        expected_output: String,
        actual_output: String,
    },
    Errored {
        reason: String,
    },
}

impl SmokeStatus {
    pub fn passed(&self) -> bool {
        matches!(self, Self::Passed)
    }

    /// One-line label for reporting.
    pub fn label(&self) -> &'static str {
        match self {
            Self::NotRun => "not run",
            Self::Running => "running",
            Self::Passed => "passed",
            Self::Failed { .. } => "failed",
            Self::Errored { .. } => "errored",
        }
    }
}

/// Decide the outcome from observed behavior.
///
/// Passing requires both conditions: the exit code matches exactly, and the
/// expected output appears as a substring of the combined captured output.
pub fn judge(
    expected_exit: i32,
    expected_output: &str,
    actual_exit: i32,
    actual_output: &str,
) -> SmokeStatus {
    if expected_exit == actual_exit && actual_output.contains(expected_output) {
        SmokeStatus::Passed
    } else {
        SmokeStatus::Failed {
            expected_exit,
            actual_exit,
            expected_output: expected_output.to_string(),
            actual_output: actual_output.to_string(),
        }
    }
}

/// One smoke test bound to an installed prefix.
pub struct SmokeTest {
    spec: TestSpec,
    prefix: PathBuf,
    timeout: Duration,
    status: SmokeStatus,
}

impl SmokeTest {
    pub fn new(spec: TestSpec, prefix: impl Into<PathBuf>, timeout: Duration) -> Self {
        Self {
            spec,
            prefix: prefix.into(),
            timeout,
            status: SmokeStatus::NotRun,
        }
    }

    pub fn status(&self) -> &SmokeStatus {
        &self.status
    }

    /// Resolve the command template against the prefix layout.
    ///
    /// `{bin}` names the prefix's `bin` directory, `{prefix}` the prefix
    /// itself.
    fn resolved_command(&self) -> Vec<String> {
        let bin = self.prefix.join("bin");
        self.spec
            .command
            .iter()
            .map(|part| {
                part.replace("{bin}", &bin.to_string_lossy())
                    .replace("{prefix}", &self.prefix.to_string_lossy())
            })
            .collect()
    }

    /// Execute the test with the configured timeout and adjudicate.
    pub async fn run(&mut self) -> &SmokeStatus {
        self.status = SmokeStatus::Running;

        let argv = self.resolved_command();
        let Some((program, args)) = argv.split_first() else {
            self.status = SmokeStatus::Errored {
                reason: "empty test command".to_string(),
            };
            return &self.status;
        };

        tracing::debug!(command = ?argv, "running smoke test");

        self.status = match run_captured(
            Path::new(program),
            args,
            Some(&self.prefix),
            None,
            Some(self.timeout),
        )
        .await
        {
            Ok(out) => judge(
                self.spec.exit_code,
                &self.spec.expect_output,
                out.exit_code,
                &out.output,
            ),
            Err(e) => SmokeStatus::Errored {
                reason: format!("{program}: {e}"),
            },
        };

        &self.status
    }
}
