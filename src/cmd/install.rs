//! Install command

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use tokio_util::sync::CancellationToken;

use alembic::core::builder::SystemBuildTool;
use alembic::ops::install::{InstallOptions, install_formulas};
use alembic::ui::ConsoleReporter;

use crate::Cli;

pub async fn install(cli: &Cli, formulas: &[String], cancel: CancellationToken) -> Result<()> {
    let reporter = ConsoleReporter::new(cli.quiet);
    let opts = Arc::new(InstallOptions {
        home: alembic::alembic_home(),
        formula_dir: cli.formula_dir(),
        jobs: cli.jobs(),
        fetch_timeout: Duration::from_secs(cli.fetch_timeout),
        test_timeout: Duration::from_secs(cli.test_timeout),
        dry_run: cli.dry_run,
    });

    install_formulas(&reporter, formulas, Arc::new(SystemBuildTool), opts, cancel)
        .await
        .map_err(|e| anyhow::anyhow!("{} failed ({}): {e}", e.step(), e.kind()))
}
