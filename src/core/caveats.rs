//! Post-install advisory rendering
//!
//! Pure text production: the formula's caveat template with the resolved
//! prefix substituted, followed by the runtime dependencies the installed
//! artifact expects to find externally. Rendering never fails; absent
//! pieces simply render as nothing.

use std::path::Path;

use crate::core::formula::Formula;

/// Render the advisory for an installed formula.
pub fn render(formula: &Formula, prefix: &Path) -> String {
    let mut out = String::new();

    let text = formula.caveats.text.trim_end();
    if !text.is_empty() {
        out.push_str(&text.replace("{prefix}", &prefix.to_string_lossy()));
        out.push('\n');
    }

    if !formula.dependencies.runtime.is_empty() {
        if !out.is_empty() {
            out.push('\n');
        }
        out.push_str("Expects to find externally (not managed here):\n");
        for dep in &formula.dependencies.runtime {
            out.push_str("  - ");
            out.push_str(dep);
            out.push('\n');
        }
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn formula(caveat: &str, runtime: &[&str]) -> Formula {
        let deps = runtime
            .iter()
            .map(|d| format!("\"{d}\""))
            .collect::<Vec<_>>()
            .join(", ");
        Formula::from_str(&format!(
            r#"
[formula]
name = "demo"
license = "MIT"

[[source]]
url = "https://example.com/demo.tar.gz"
sha256 = "{}"

[dependencies]
runtime = [{deps}]

[caveats]
text = "{caveat}"
"#,
            "0".repeat(64)
        ))
        .unwrap()
    }

    #[test]
    fn substitutes_prefix() {
        let f = formula("installed under {prefix}", &[]);
        let text = render(&f, Path::new("/opt/demo/1.0"));
        assert_eq!(text, "installed under /opt/demo/1.0\n");
    }

    #[test]
    fn lists_runtime_dependencies() {
        let f = formula("", &["tmux", "rliamp"]);
        let text = render(&f, Path::new("/opt/demo"));
        assert!(text.contains("  - tmux\n"));
        assert!(text.contains("  - rliamp\n"));
    }

    #[test]
    fn empty_formula_renders_empty() {
        let f = formula("", &[]);
        assert_eq!(render(&f, Path::new("/opt/demo")), "");
    }
}
