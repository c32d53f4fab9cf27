//! Build backend adapter
//!
//! Normalizes formula build steps into subprocess invocations against a
//! pluggable build-tool capability. Two argument idioms are supported as
//! variants of one contract: literal argument lists with `{src}`/`{prefix}`
//! placeholders, and a normalized strategy that derives the conventional
//! install flags from the source path alone. Adding a third convention
//! touches only this module.

use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

use crate::core::formula::BuildStep;
use crate::types::FormulaName;

#[derive(Error, Debug)]
pub enum BuildError {
    #[error("build step '{step}' failed with exit code {exit_code}")]
    StepFailed {
        step: String,
        exit_code: i32,
        output: String,
    },

    #[error("build step '{step}' could not launch: {source}")]
    Launch {
        step: String,
        #[source]
        source: io::Error,
    },

    #[error("build cancelled")]
    Cancelled,
}

/// Captured result of one subprocess invocation.
#[derive(Debug, Clone)]
pub struct ToolOutput {
    pub exit_code: i32,
    /// Combined stdout and stderr, in that order.
    pub output: String,
}

/// External build-tool capability.
///
/// The engine constructs the invocation; the capability executes it and
/// reports exit status plus captured output. It never interprets the
/// tool's behavior.
#[async_trait]
pub trait BuildTool: Send + Sync {
    async fn invoke(
        &self,
        tool: &str,
        args: &[String],
        cwd: &Path,
        prefix: &Path,
    ) -> io::Result<ToolOutput>;
}

/// Default capability: run the tool as a host subprocess.
pub struct SystemBuildTool;

#[async_trait]
impl BuildTool for SystemBuildTool {
    async fn invoke(
        &self,
        tool: &str,
        args: &[String],
        cwd: &Path,
        prefix: &Path,
    ) -> io::Result<ToolOutput> {
        run_captured(Path::new(tool), args, Some(cwd), Some(prefix), None).await
    }
}

/// Run a program and capture combined output.
///
/// Shared by the build adapter and the smoke-test harness: both invoke an
/// executable with arguments, an optional working directory, and an
/// optional timeout, and need the exit code plus combined stdout/stderr.
/// On timeout the child is killed and `ErrorKind::TimedOut` is returned.
pub async fn run_captured(
    program: &Path,
    args: &[String],
    cwd: Option<&Path>,
    prefix: Option<&Path>,
    timeout: Option<Duration>,
) -> io::Result<ToolOutput> {
    let mut command = tokio::process::Command::new(program);
    command.args(args).kill_on_drop(true);
    if let Some(dir) = cwd {
        command.current_dir(dir);
    }
    if let Some(prefix) = prefix {
        command.env("PREFIX", prefix);
    }

    let output = match timeout {
        Some(limit) => tokio::time::timeout(limit, command.output())
            .await
            .map_err(|_| io::Error::new(io::ErrorKind::TimedOut, "subprocess timed out"))??,
        None => command.output().await?,
    };

    let mut combined = String::from_utf8_lossy(&output.stdout).into_owned();
    combined.push_str(&String::from_utf8_lossy(&output.stderr));

    Ok(ToolOutput {
        exit_code: output.status.code().unwrap_or(-1),
        output: combined,
    })
}

/// Resolve a build step's arguments against the source tree and prefix.
///
/// Both idioms end in the same place: an argument list that determines the
/// source path and the destination prefix.
pub fn resolve_args(step: &BuildStep, src: &Path, prefix: &Path) -> Vec<String> {
    match (&step.args, &step.strategy) {
        (Some(args), _) => args
            .iter()
            .map(|arg| {
                arg.replace("{src}", &src.to_string_lossy())
                    .replace("{prefix}", &prefix.to_string_lossy())
            })
            .collect(),
        (None, _) => std_install_args(src, prefix),
    }
}

/// The normalized install convention: flags derived from the source path,
/// with the tool's own `--root` idiom naming the destination.
fn std_install_args(src: &Path, prefix: &Path) -> Vec<String> {
    vec![
        "install".to_string(),
        "--locked".to_string(),
        "--root".to_string(),
        prefix.to_string_lossy().into_owned(),
        "--path".to_string(),
        src.to_string_lossy().into_owned(),
    ]
}

/// Runs a formula's build recipe, one step at a time.
pub struct Builder<'a> {
    tool: &'a dyn BuildTool,
    log_path: Option<PathBuf>,
}

impl<'a> Builder<'a> {
    pub fn new(tool: &'a dyn BuildTool) -> Self {
        Self {
            tool,
            log_path: None,
        }
    }

    /// Append each step's captured output to a build log.
    pub fn with_log(mut self, path: PathBuf) -> Self {
        self.log_path = Some(path);
        self
    }

    /// Execute every step of the recipe in order.
    ///
    /// A non-zero exit from any step is fatal and nothing after it runs.
    /// Cancellation is honored between steps and mid-subprocess (the child
    /// is killed on drop).
    pub async fn run(
        &self,
        name: &FormulaName,
        recipe: &[BuildStep],
        src: &Path,
        prefix: &Path,
        cancel: &CancellationToken,
    ) -> Result<(), BuildError> {
        for (i, step) in recipe.iter().enumerate() {
            if cancel.is_cancelled() {
                return Err(BuildError::Cancelled);
            }

            let args = resolve_args(step, src, prefix);
            let label = format!("{}[{}] {}", name, i, step.tool);
            tracing::debug!(formula = %name, step = i, tool = %step.tool, ?args, "build step");

            let result = tokio::select! {
                r = self.tool.invoke(&step.tool, &args, src, prefix) => r,
                _ = cancel.cancelled() => return Err(BuildError::Cancelled),
            };

            let output = result.map_err(|source| BuildError::Launch {
                step: label.clone(),
                source,
            })?;

            self.append_log(&label, &output);

            if output.exit_code != 0 {
                return Err(BuildError::StepFailed {
                    step: label,
                    exit_code: output.exit_code,
                    output: output.output,
                });
            }
        }

        Ok(())
    }

    fn append_log(&self, label: &str, output: &ToolOutput) {
        use std::io::Write;

        let Some(path) = &self.log_path else {
            return;
        };
        if let Some(parent) = path.parent() {
            let _ = std::fs::create_dir_all(parent);
        }
        if let Ok(mut file) = std::fs::OpenOptions::new().create(true).append(true).open(path) {
            let _ = writeln!(file, "==> {label} (exit {})", output.exit_code);
            let _ = file.write_all(output.output.as_bytes());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::formula::ArgStrategy;

    fn literal_step(args: &[&str]) -> BuildStep {
        BuildStep {
            tool: "cargo".to_string(),
            args: Some(args.iter().map(|s| s.to_string()).collect()),
            strategy: None,
        }
    }

    #[test]
    fn literal_args_substitute_placeholders() {
        let step = literal_step(&["install", "--path", "{src}", "--root", "{prefix}"]);
        let args = resolve_args(&step, Path::new("/tmp/src"), Path::new("/tmp/prefix"));
        assert_eq!(args, vec!["install", "--path", "/tmp/src", "--root", "/tmp/prefix"]);
    }

    #[test]
    fn std_args_derive_from_source_path() {
        let step = BuildStep {
            tool: "cargo".to_string(),
            args: None,
            strategy: Some(ArgStrategy::StdArgs),
        };
        let args = resolve_args(&step, Path::new("/tmp/src"), Path::new("/tmp/prefix"));
        assert_eq!(
            args,
            vec!["install", "--locked", "--root", "/tmp/prefix", "--path", "/tmp/src"]
        );
    }

    #[test]
    fn both_idioms_name_source_and_prefix() {
        let literal = literal_step(&["install", "--path", "{src}", "--root", "{prefix}"]);
        let normalized = BuildStep {
            tool: "cargo".to_string(),
            args: None,
            strategy: Some(ArgStrategy::StdArgs),
        };

        for step in [literal, normalized] {
            let args = resolve_args(&step, Path::new("/s"), Path::new("/p"));
            assert!(args.iter().any(|a| a == "/s"));
            assert!(args.iter().any(|a| a == "/p"));
        }
    }

    #[tokio::test]
    async fn run_captured_combines_streams() {
        let out = run_captured(
            Path::new("sh"),
            &["-c".to_string(), "echo visible; echo hidden 1>&2; exit 3".to_string()],
            None,
            None,
            None,
        )
        .await
        .unwrap();

        assert_eq!(out.exit_code, 3);
        assert!(out.output.contains("visible"));
        assert!(out.output.contains("hidden"));
    }

    #[tokio::test]
    async fn run_captured_times_out() {
        let err = run_captured(
            Path::new("sh"),
            &["-c".to_string(), "sleep 5".to_string()],
            None,
            None,
            Some(Duration::from_millis(50)),
        )
        .await
        .unwrap_err();

        assert_eq!(err.kind(), io::ErrorKind::TimedOut);
    }

    #[tokio::test]
    async fn failing_step_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let recipe = vec![
            BuildStep {
                tool: "sh".to_string(),
                args: Some(vec!["-c".to_string(), "exit 7".to_string()]),
                strategy: None,
            },
            BuildStep {
                tool: "sh".to_string(),
                args: Some(vec!["-c".to_string(), "touch {prefix}/never".to_string()]),
                strategy: None,
            },
        ];

        let builder = Builder::new(&SystemBuildTool);
        let cancel = CancellationToken::new();
        let err = builder
            .run(
                &FormulaName::new("demo"),
                &recipe,
                dir.path(),
                dir.path(),
                &cancel,
            )
            .await
            .unwrap_err();

        match err {
            BuildError::StepFailed { exit_code, .. } => assert_eq!(exit_code, 7),
            other => panic!("expected StepFailed, got {other:?}"),
        }
        assert!(!dir.path().join("never").exists());
    }

    #[tokio::test]
    async fn cancelled_before_start() {
        let dir = tempfile::tempdir().unwrap();
        let recipe = vec![BuildStep {
            tool: "sh".to_string(),
            args: Some(vec!["-c".to_string(), "true".to_string()]),
            strategy: None,
        }];

        let cancel = CancellationToken::new();
        cancel.cancel();

        let builder = Builder::new(&SystemBuildTool);
        let err = builder
            .run(&FormulaName::new("demo"), &recipe, dir.path(), dir.path(), &cancel)
            .await
            .unwrap_err();
        assert!(matches!(err, BuildError::Cancelled));
    }
}
