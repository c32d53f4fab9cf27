//! Dependency resolution
//!
//! Partitions declared dependencies by stage, orders build dependencies for
//! installation ahead of their dependents, and detects cycles. Runtime
//! dependencies are never auto-installed: they are surfaced in caveats and,
//! when the caller supplies a presence probe, checked by name.

use std::collections::{HashMap, HashSet, VecDeque};
use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::core::formula::{Formula, FormulaError};
use crate::types::FormulaName;

#[derive(Error, Debug)]
pub enum ResolveError {
    #[error("{0}")]
    Formula(#[from] FormulaError),

    #[error("dependency cycle involving '{name}'")]
    Cycle { name: FormulaName },

    #[error("unresolved build dependency '{name}'")]
    Unresolved { name: FormulaName },
}

/// Source of formula definitions for dependency lookup.
pub trait FormulaLoader {
    /// Load the formula for `name`, or `None` if no definition exists.
    fn load(&self, name: &FormulaName) -> Result<Option<Formula>, FormulaError>;
}

/// Loads `<dir>/<name>.toml` definitions from a formula directory.
pub struct DirLoader {
    dir: PathBuf,
}

impl DirLoader {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn path_for(&self, name: &FormulaName) -> PathBuf {
        self.dir.join(format!("{name}.toml"))
    }
}

impl FormulaLoader for DirLoader {
    fn load(&self, name: &FormulaName) -> Result<Option<Formula>, FormulaError> {
        let path = self.path_for(name);
        if !path.exists() {
            return Ok(None);
        }
        Formula::from_file(&path).map(Some)
    }
}

/// Resolves the install order for a set of root formulas.
///
/// Returns every formula that must be installed, build dependencies before
/// their dependents. A build dependency with no formula definition is
/// accepted when `externally_present` vouches for it (e.g. a toolchain on
/// `PATH` or a prior installation); otherwise resolution fails.
pub fn install_order<L, P>(
    roots: &[FormulaName],
    loader: &L,
    externally_present: P,
) -> Result<Vec<FormulaName>, ResolveError>
where
    L: FormulaLoader,
    P: Fn(&FormulaName) -> bool,
{
    let mut order = Vec::new();
    let mut visited = HashSet::new();
    let mut visiting = HashSet::new();

    for name in roots {
        resolve_recursive(
            name,
            true,
            loader,
            &externally_present,
            &mut order,
            &mut visited,
            &mut visiting,
        )?;
    }

    Ok(order)
}

fn resolve_recursive<L, P>(
    name: &FormulaName,
    is_root: bool,
    loader: &L,
    externally_present: &P,
    order: &mut Vec<FormulaName>,
    visited: &mut HashSet<FormulaName>,
    visiting: &mut HashSet<FormulaName>,
) -> Result<(), ResolveError>
where
    L: FormulaLoader,
    P: Fn(&FormulaName) -> bool,
{
    if visited.contains(name) {
        return Ok(());
    }

    if visiting.contains(name) {
        return Err(ResolveError::Cycle { name: name.clone() });
    }

    let formula = match loader.load(name)? {
        Some(f) => f,
        None if !is_root && externally_present(name) => {
            visited.insert(name.clone());
            return Ok(());
        }
        None => return Err(ResolveError::Unresolved { name: name.clone() }),
    };

    // A formula naming itself in either stage is a cycle, not a real edge.
    if formula
        .dependencies
        .runtime
        .iter()
        .any(|dep| FormulaName::new(dep) == *name)
    {
        return Err(ResolveError::Cycle { name: name.clone() });
    }

    visiting.insert(name.clone());

    for dep in &formula.dependencies.build {
        let dep_name = FormulaName::new(dep);
        if dep_name == *name {
            return Err(ResolveError::Cycle { name: name.clone() });
        }
        resolve_recursive(
            &dep_name,
            false,
            loader,
            externally_present,
            order,
            visited,
            visiting,
        )?;
    }

    visiting.remove(name);
    visited.insert(name.clone());
    order.push(name.clone());

    Ok(())
}

/// Groups an install order into layers of mutually independent formulas.
///
/// Formulas within one layer share no build-dependency edges and may be
/// installed in parallel; layers run sequentially. Names in `order` without
/// a formula definition (externally satisfied) are ignored.
pub fn parallel_layers<L: FormulaLoader>(
    order: &[FormulaName],
    loader: &L,
) -> Result<Vec<Vec<FormulaName>>, ResolveError> {
    let members: HashSet<&FormulaName> = order.iter().collect();
    let mut adjacency: HashMap<FormulaName, Vec<FormulaName>> = HashMap::new();
    let mut in_degree: HashMap<FormulaName, usize> = HashMap::new();

    for name in order {
        in_degree.entry(name.clone()).or_default();
        let Some(formula) = loader.load(name)? else {
            continue;
        };
        for dep in &formula.dependencies.build {
            let dep_name = FormulaName::new(dep);
            if !members.contains(&dep_name) {
                continue;
            }
            adjacency
                .entry(dep_name)
                .or_default()
                .push(name.clone());
            *in_degree.entry(name.clone()).or_default() += 1;
        }
    }

    let mut ready: Vec<FormulaName> = in_degree
        .iter()
        .filter(|(_, d)| **d == 0)
        .map(|(n, _)| n.clone())
        .collect();
    ready.sort();
    let mut queue = VecDeque::from(ready);

    let mut layers = Vec::new();
    let mut placed = 0;

    while !queue.is_empty() {
        let mut layer = Vec::new();
        let mut next = Vec::new();

        while let Some(name) = queue.pop_front() {
            placed += 1;
            if let Some(dependents) = adjacency.get(&name) {
                for dependent in dependents {
                    let degree = in_degree
                        .get_mut(dependent)
                        .expect("dependent missing from in-degree map");
                    *degree -= 1;
                    if *degree == 0 {
                        next.push(dependent.clone());
                    }
                }
            }
            layer.push(name);
        }

        layer.sort();
        layers.push(layer);
        next.sort();
        queue = VecDeque::from(next);
    }

    if placed < in_degree.len() {
        let name = in_degree
            .keys()
            .find(|n| !layers.iter().flatten().any(|p| p == *n))
            .cloned()
            .unwrap_or_else(|| FormulaName::new("unknown"));
        return Err(ResolveError::Cycle { name });
    }

    Ok(layers)
}

/// Probe whether a dependency is satisfiable outside the formula universe:
/// an executable with that name reachable on `PATH`.
pub fn on_path(name: &FormulaName) -> bool {
    which::which(Path::new(name.as_str())).is_ok()
}

/// Presence report for runtime dependencies, for advisory output.
pub fn runtime_presence<P>(formula: &Formula, probe: P) -> Vec<(String, bool)>
where
    P: Fn(&FormulaName) -> bool,
{
    formula
        .dependencies
        .runtime
        .iter()
        .map(|dep| (dep.clone(), probe(&FormulaName::new(dep))))
        .collect()
}
