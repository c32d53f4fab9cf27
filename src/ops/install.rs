//! Formula installation pipeline
//!
//! One formula's pipeline is strictly sequential: fetch -> verify ->
//! build -> install -> test. Independent formulas install in parallel,
//! grouped into dependency layers and gated by a concurrency limit.
//! Per-name locks serialize installs of the same formula so record swaps
//! never race.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use reqwest::Client;
use tokio::sync::{Mutex, Semaphore};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use walkdir::WalkDir;

use crate::core::builder::{BuildTool, Builder};
use crate::core::caveats;
use crate::core::formula::Formula;
use crate::core::resolver::{self, DirLoader, FormulaLoader};
use crate::core::smoke::SmokeTest;
use crate::io::fetch::{FetchError, Fetcher};
use crate::ops::InstallError;
use crate::ops::flow::{FormulaSpec, ResolvedFormula, UnresolvedFormula};
use crate::store::{RegistryHandle, records};
use crate::types::FormulaName;
use crate::ui::Reporter;

/// Name of the opaque manifest file written inside each prefix.
pub const MANIFEST_FILE: &str = ".alembic-manifest.json";

/// Pipeline configuration. Paths derive from one home directory so tests
/// can sandbox everything.
#[derive(Debug, Clone)]
pub struct InstallOptions {
    pub home: PathBuf,
    pub formula_dir: PathBuf,
    /// Concurrency limit for parallel installs.
    pub jobs: usize,
    /// Per-attempt fetch timeout. Recoverable: the next source is tried.
    pub fetch_timeout: Duration,
    /// Smoke-test timeout. On expiry the test errors, the install stands.
    pub test_timeout: Duration,
    pub dry_run: bool,
}

impl InstallOptions {
    pub fn cache_dir(&self) -> PathBuf {
        self.home.join("cache")
    }

    pub fn tmp_dir(&self) -> PathBuf {
        self.home.join("tmp")
    }

    pub fn prefix_dir(&self) -> PathBuf {
        self.home.join("prefix")
    }

    pub fn records_path(&self) -> PathBuf {
        self.home.join("records.json")
    }

    pub fn log_dir(&self) -> PathBuf {
        self.home.join("logs")
    }
}

/// Per-name mutual exclusion so two pipelines never race one formula.
#[derive(Default)]
pub struct NameLocks {
    inner: std::sync::Mutex<HashMap<FormulaName, Arc<Mutex<()>>>>,
}

impl NameLocks {
    pub fn for_name(&self, name: &FormulaName) -> Arc<Mutex<()>> {
        let mut map = self.inner.lock().expect("name lock table poisoned");
        map.entry(name.clone()).or_default().clone()
    }
}

/// Loader that prefers formulas given explicitly on the command line
/// (possibly by file path) over the formula directory.
struct PipelineLoader {
    dir: DirLoader,
    preloaded: HashMap<FormulaName, Formula>,
}

impl FormulaLoader for PipelineLoader {
    fn load(
        &self,
        name: &FormulaName,
    ) -> Result<Option<Formula>, crate::core::formula::FormulaError> {
        if let Some(formula) = self.preloaded.get(name) {
            return Ok(Some(formula.clone()));
        }
        self.dir.load(name)
    }
}

enum InstallOutcome {
    Installed,
    AlreadyInstalled,
}

/// Resolve, fetch, build, and install a set of formulas.
///
/// Build dependencies install before their dependents; runtime
/// dependencies are only surfaced. The first fatal error stops later
/// layers (their dependents could not succeed) and is returned after
/// in-flight work settles.
pub async fn install_formulas<R: Reporter + Clone + 'static>(
    reporter: &R,
    targets: &[String],
    tool: Arc<dyn BuildTool>,
    opts: Arc<InstallOptions>,
    cancel: CancellationToken,
) -> Result<(), InstallError> {
    let start = Instant::now();
    let registry = RegistryHandle::spawn(opts.records_path())?;

    let mut preloaded = HashMap::new();
    let mut roots = Vec::new();
    let mut pins: HashMap<FormulaName, String> = HashMap::new();

    let dir_loader = DirLoader::new(&opts.formula_dir);
    for target in targets {
        let spec = FormulaSpec::parse(target);
        let resolved = UnresolvedFormula::new(spec).resolve(&dir_loader)?;
        let name = resolved.name();
        if let Some(pin) = &resolved.pin {
            pins.insert(name.clone(), pin.clone());
        }
        preloaded.insert(name.clone(), resolved.formula);
        roots.push(name);
    }

    let loader = Arc::new(PipelineLoader {
        dir: DirLoader::new(&opts.formula_dir),
        preloaded,
    });

    // Static resolution happens before any network or subprocess activity.
    let order = resolver::install_order(&roots, loader.as_ref(), resolver::on_path)?;
    let layers = resolver::parallel_layers(&order, loader.as_ref())?;

    if opts.dry_run {
        for layer in &layers {
            let names: Vec<&str> = layer.iter().map(FormulaName::as_str).collect();
            reporter.info(&format!("would install: {}", names.join(", ")));
        }
        registry.shutdown();
        return Ok(());
    }

    let client = Client::builder()
        .tcp_nodelay(true)
        .build()
        .map_err(|e| InstallError::Fetch(FetchError::Http(e)))?;

    let semaphore = Arc::new(Semaphore::new(opts.jobs.max(1)));
    let locks = Arc::new(NameLocks::default());

    let mut installed = 0usize;
    let mut first_error: Option<InstallError> = None;

    for layer in layers {
        let mut set: JoinSet<Result<InstallOutcome, (FormulaName, InstallError)>> = JoinSet::new();

        for name in layer {
            let pin = pins.get(&name).cloned();
            let loader = loader.clone();
            let registry = registry.clone();
            let client = client.clone();
            let tool = tool.clone();
            let opts = opts.clone();
            let locks = locks.clone();
            let semaphore = semaphore.clone();
            let reporter = reporter.clone();
            let cancel = cancel.clone();

            set.spawn(async move {
                install_one(
                    name.clone(),
                    pin,
                    loader,
                    registry,
                    client,
                    tool,
                    opts,
                    locks,
                    semaphore,
                    reporter,
                    cancel,
                )
                .await
                .map_err(|e| (name, e))
            });
        }

        while let Some(res) = set.join_next().await {
            match res {
                Ok(Ok(InstallOutcome::Installed)) => installed += 1,
                Ok(Ok(InstallOutcome::AlreadyInstalled)) => {}
                Ok(Err((name, e))) => {
                    reporter.failed(&name, &format!("{} ({}): {e}", e.step(), e.kind()));
                    if first_error.is_none() {
                        first_error = Some(e);
                    }
                }
                Err(join_err) => {
                    reporter.error(&format!("internal error: {join_err}"));
                    if first_error.is_none() {
                        first_error =
                            Some(InstallError::Incomplete(format!("task panicked: {join_err}")));
                    }
                }
            }
        }

        if first_error.is_some() {
            break;
        }
    }

    registry.shutdown();

    if let Some(e) = first_error {
        return Err(e);
    }

    if installed > 0 {
        reporter.summary(installed, "installed", start.elapsed().as_secs_f64());
    }
    Ok(())
}

#[allow(clippy::too_many_arguments)]
async fn install_one<R: Reporter>(
    name: FormulaName,
    pin: Option<String>,
    loader: Arc<PipelineLoader>,
    registry: RegistryHandle,
    client: Client,
    tool: Arc<dyn BuildTool>,
    opts: Arc<InstallOptions>,
    locks: Arc<NameLocks>,
    semaphore: Arc<Semaphore>,
    reporter: R,
    cancel: CancellationToken,
) -> Result<InstallOutcome, InstallError> {
    let _permit = semaphore
        .acquire_owned()
        .await
        .map_err(|_| InstallError::Cancelled)?;
    let lock = locks.for_name(&name);
    let _guard = lock.lock().await;

    if cancel.is_cancelled() {
        return Err(InstallError::Cancelled);
    }

    let formula = loader
        .load(&name)?
        .ok_or_else(|| InstallError::Validation(format!("no formula definition for '{name}'")))?;
    let resolved = ResolvedFormula { formula, pin };

    // Idempotence: an intact install of a declared source is kept as-is.
    if let Some(record) = registry.active(name.clone()).await? {
        let matches_declared = resolved.sources().iter().any(|s| s.sha256 == record.sha256);
        if matches_declared && record.prefix.exists() {
            let version = record.version.clone().unwrap_or_default();
            reporter.done(&name, &version, "already installed");
            return Ok(InstallOutcome::AlreadyInstalled);
        }
    }

    let fetcher = Fetcher::new(&client, opts.cache_dir(), opts.fetch_timeout);
    let fetched = resolved.fetch(&fetcher, &opts.tmp_dir(), &reporter).await?;

    if cancel.is_cancelled() {
        return Err(InstallError::Cancelled);
    }

    let formula = &fetched.resolved.formula;
    let version_label = fetched
        .source
        .version
        .clone()
        .unwrap_or_else(|| fetched.source.digest.as_str()[..12].to_string());

    // Build into a staging prefix inside the fetch working tree; a failed
    // or cancelled build discards everything with the temp dir.
    let staging_prefix = fetched.temp_dir.path().join("stage");
    std::fs::create_dir_all(&staging_prefix)?;

    if !formula.build.is_empty() {
        let tools: Vec<&str> = formula.build.iter().map(|s| s.tool.as_str()).collect();
        reporter.building(&name, &tools.join(", "));
    }

    let log_path = opts.log_dir().join(format!(
        "build-{name}-{version_label}-{}.log",
        chrono::Utc::now().format("%Y%m%d-%H%M%S")
    ));
    let builder = Builder::new(tool.as_ref()).with_log(log_path);
    builder
        .run(
            &name,
            &formula.build,
            &fetched.source_tree,
            &staging_prefix,
            &cancel,
        )
        .await?;

    if cancel.is_cancelled() {
        return Err(InstallError::Cancelled);
    }

    reporter.installing(&name, &version_label);
    let final_prefix = opts.prefix_dir().join(name.as_str()).join(&version_label);

    let staging = staging_prefix.clone();
    let dest = final_prefix.clone();
    let manifest = tokio::task::spawn_blocking(move || stage_into_place(&staging, &dest))
        .await
        .map_err(|e| InstallError::Incomplete(format!("install task panicked: {e}")))??;

    let record = records::record_for(
        name.clone(),
        fetched.source.version.clone(),
        fetched.source.url.clone(),
        fetched.source.digest.clone(),
        &final_prefix,
        manifest,
    );
    registry.commit(record).await?;
    reporter.done(&name, &version_label, "installed");

    let advisory = caveats::render(formula, &final_prefix);
    reporter.caveats(&name, &advisory);
    for (dep, present) in resolver::runtime_presence(formula, resolver::on_path) {
        if !present {
            reporter.warning(&format!(
                "{name}: runtime dependency '{dep}' not found on PATH"
            ));
        }
    }

    // Smoke test: reported, never rolled back.
    if let Some(spec) = formula.test.clone() {
        let mut test = SmokeTest::new(spec, &final_prefix, opts.test_timeout);
        let status = test.run().await;
        reporter.smoke(&name, status);
    }

    Ok(InstallOutcome::Installed)
}

/// Swap a fully staged tree into its final prefix.
///
/// Install-then-swap: the destination is replaced only after staging is
/// complete, and a displaced prior tree is restored if the swap fails.
/// Returns the manifest of staged paths, collected after the swap so the
/// record only ever references files that exist.
fn stage_into_place(staging: &Path, dest: &Path) -> Result<Vec<PathBuf>, InstallError> {
    if let Some(parent) = dest.parent() {
        std::fs::create_dir_all(parent)?;
    }

    // Version directories contain dots, so build the displaced name by
    // appending rather than swapping an "extension".
    let displaced = dest.with_file_name(format!(
        "{}.superseded",
        dest.file_name().unwrap_or_default().to_string_lossy()
    ));
    if displaced.exists() {
        std::fs::remove_dir_all(&displaced)?;
    }
    let had_previous = dest.exists();
    if had_previous {
        std::fs::rename(dest, &displaced)?;
    }

    if let Err(rename_err) = std::fs::rename(staging, dest) {
        // Cross-volume fallback
        if copy_dir_all(staging, dest).is_err() {
            let _ = std::fs::remove_dir_all(dest);
            if had_previous {
                let _ = std::fs::rename(&displaced, dest);
            }
            return Err(InstallError::Incomplete(format!(
                "could not move staged tree into place: {rename_err}"
            )));
        }
    }
    if had_previous {
        let _ = std::fs::remove_dir_all(&displaced);
    }

    let manifest = collect_manifest(dest)?;
    let content = serde_json::to_string_pretty(&manifest)
        .map_err(|e| InstallError::Incomplete(format!("manifest encoding failed: {e}")))?;
    std::fs::write(dest.join(MANIFEST_FILE), content)?;

    Ok(manifest)
}

fn collect_manifest(prefix: &Path) -> Result<Vec<PathBuf>, InstallError> {
    let mut files = Vec::new();
    for entry in WalkDir::new(prefix) {
        let entry =
            entry.map_err(|e| InstallError::Incomplete(format!("manifest walk failed: {e}")))?;
        if entry.file_type().is_file() {
            if let Ok(rel) = entry.path().strip_prefix(prefix) {
                files.push(rel.to_path_buf());
            }
        }
    }
    files.sort();
    Ok(files)
}

fn copy_dir_all(src: &Path, dst: &Path) -> Result<(), InstallError> {
    std::fs::create_dir_all(dst)?;
    fs_extra::dir::copy(
        src,
        dst,
        &fs_extra::dir::CopyOptions::new().content_only(true),
    )
    .map_err(|e| InstallError::Incomplete(format!("copy failed: {e}")))?;
    Ok(())
}
