use std::path::{Path, PathBuf};
use std::process::Command;

use sha2::{Digest, Sha256};
use tempfile::TempDir;

/// Test context that sets up a temporary alembic home environment
struct TestContext {
    temp_dir: TempDir,
    home: PathBuf,
}

impl TestContext {
    fn new() -> Self {
        let temp_dir = TempDir::new().expect("failed to create temp dir");
        let home = temp_dir.path().join(".alembic");
        std::fs::create_dir_all(home.join("formulas")).expect("failed to create alembic home");

        Self { temp_dir, home }
    }

    fn cmd(&self) -> Command {
        let bin_path = env!("CARGO_BIN_EXE_alembic");
        let mut cmd = Command::new(bin_path);
        cmd.env("HOME", self.temp_dir.path());
        cmd.env("ALEMBIC_HOME", &self.home);
        cmd
    }

    fn write_formula(&self, name: &str, body: &str) {
        std::fs::write(self.home.join("formulas").join(format!("{name}.toml")), body)
            .expect("failed to write formula");
    }
}

/// Build a small gzipped tarball and return its bytes.
fn make_tar_gz(dest: &Path, files: &[(&str, &str)]) -> Vec<u8> {
    let file = std::fs::File::create(dest).unwrap();
    let encoder = flate2::write::GzEncoder::new(file, flate2::Compression::default());
    let mut builder = tar::Builder::new(encoder);

    for (path, content) in files {
        let mut header = tar::Header::new_gnu();
        header.set_size(content.len() as u64);
        header.set_mode(0o755);
        header.set_cksum();
        builder
            .append_data(&mut header, path, content.as_bytes())
            .unwrap();
    }

    builder.into_inner().unwrap().finish().unwrap();
    std::fs::read(dest).unwrap()
}

fn sha256_hex(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hex::encode(hasher.finalize())
}

#[test]
fn test_help_command() {
    let ctx = TestContext::new();
    let output = ctx.cmd().arg("--help").output().expect("failed to run alembic");
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("Usage:"));
}

#[test]
fn test_version_command() {
    let ctx = TestContext::new();
    let output = ctx
        .cmd()
        .arg("--version")
        .output()
        .expect("failed to run alembic");
    assert!(output.status.success());
}

#[test]
fn test_check_shipped_formula() {
    let ctx = TestContext::new();
    let formula = Path::new(env!("CARGO_MANIFEST_DIR")).join("formulas/arliamp.toml");

    let output = ctx
        .cmd()
        .arg("check")
        .arg(&formula)
        .output()
        .expect("failed to run alembic check");

    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("arliamp ok"));
    // The unrepresentable-license sentinel survives end to end.
    assert!(stdout.contains(":cannot_represent"));
}

#[test]
fn test_check_rejects_malformed_formula() {
    let ctx = TestContext::new();
    let bad = ctx.temp_dir.path().join("bad.toml");
    // Missing license and sources
    std::fs::write(&bad, "[formula]\nname = \"bad\"\n").unwrap();

    let output = ctx
        .cmd()
        .arg("check")
        .arg(&bad)
        .output()
        .expect("failed to run alembic check");

    assert!(!output.status.success());
}

#[test]
fn test_install_unknown_formula_fails() {
    let ctx = TestContext::new();
    let output = ctx
        .cmd()
        .args(["install", "no-such-formula"])
        .output()
        .expect("failed to run alembic install");

    assert!(!output.status.success());
}

#[test]
fn test_install_fetch_exhausted_leaves_no_record() {
    let ctx = TestContext::new();
    let mut server = mockito::Server::new();
    let _m = server.mock("GET", "/gone.tar.gz").with_status(404).create();

    ctx.write_formula(
        "gone",
        &format!(
            r#"
[formula]
name = "gone"
license = "MIT"

[[source]]
url = "{}/gone.tar.gz"
sha256 = "{}"
"#,
            server.url(),
            "0".repeat(64)
        ),
    );

    let output = ctx
        .cmd()
        .args(["install", "gone"])
        .output()
        .expect("failed to run alembic install");

    assert!(!output.status.success());
    let records = ctx.home.join("records.json");
    if records.exists() {
        let content = std::fs::read_to_string(records).unwrap();
        assert!(!content.contains("\"gone\""));
    }
}

#[test]
fn test_install_and_smoke_test_end_to_end() {
    let ctx = TestContext::new();
    let mut server = mockito::Server::new();

    let body = make_tar_gz(
        &ctx.temp_dir.path().join("hello-1.0.tar.gz"),
        &[("hello-1.0/hello.sh", "#!/bin/sh\necho hello from hello\n")],
    );
    let _m = server
        .mock("GET", "/hello-1.0.tar.gz")
        .with_status(200)
        .with_body(&body)
        .create();

    ctx.write_formula(
        "hello",
        &format!(
            r#"
[formula]
name = "hello"
description = "Smallest possible formula"
license = "MIT"

[[source]]
version = "1.0"
url = "{}/hello-1.0.tar.gz"
sha256 = "{}"

[[build]]
tool = "sh"
args = ["-c", "mkdir -p {{prefix}}/bin && cp {{src}}/hello.sh {{prefix}}/bin/hello && chmod +x {{prefix}}/bin/hello"]

[caveats]
text = "hello lives in {{prefix}}"

[test]
command = ["sh", "{{bin}}/hello"]
exit_code = 0
expect_output = "hello from hello"
"#,
            server.url(),
            sha256_hex(&body)
        ),
    );

    let output = ctx
        .cmd()
        .args(["install", "hello"])
        .output()
        .expect("failed to run alembic install");

    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(output.status.success(), "install failed: {stderr}");

    let prefix = ctx.home.join("prefix/hello/1.0");
    assert!(prefix.join("bin/hello").exists());
    assert!(prefix.join(".alembic-manifest.json").exists());

    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("Caveats"), "caveats missing: {stdout}");
    assert!(stdout.contains("test passed"), "smoke result missing: {stdout}");

    // Standalone re-run of the smoke test against the recorded install.
    let output = ctx
        .cmd()
        .args(["test", "hello"])
        .output()
        .expect("failed to run alembic test");
    assert!(output.status.success());
}

#[test]
fn test_subcommand_fails_when_not_installed() {
    let ctx = TestContext::new();
    ctx.write_formula(
        "phantom",
        &format!(
            r#"
[formula]
name = "phantom"
license = "MIT"

[[source]]
url = "https://example.com/phantom.tar.gz"
sha256 = "{}"

[test]
command = ["{{bin}}/phantom"]
exit_code = 0
expect_output = "ok"
"#,
            "0".repeat(64)
        ),
    );

    let output = ctx
        .cmd()
        .args(["test", "phantom"])
        .output()
        .expect("failed to run alembic test");

    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("not installed"));
}
