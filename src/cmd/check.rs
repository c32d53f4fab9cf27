//! Check command
//!
//! Static formula validation, no side effects.

use std::path::Path;

use anyhow::{Context, Result};

use alembic::formula::Formula;

pub fn check(path: &Path) -> Result<()> {
    let formula = Formula::from_file(path)
        .with_context(|| format!("check failed for {}", path.display()))?;

    println!("{} ok", formula.name());
    println!("  license:  {}", formula.formula.license);
    println!("  sources:  {}", formula.sources.len());
    if let Some(version) = formula.latest_version() {
        println!("  latest:   {version}");
    }
    if !formula.dependencies.build.is_empty() {
        println!("  build:    {}", formula.dependencies.build.join(", "));
    }
    if !formula.dependencies.runtime.is_empty() {
        println!("  runtime:  {}", formula.dependencies.runtime.join(", "));
    }
    println!("  steps:    {}", formula.build.len());
    println!(
        "  test:     {}",
        if formula.test.is_some() { "declared" } else { "none" }
    );

    Ok(())
}
