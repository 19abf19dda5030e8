//! Integration tests for pvesel
//!
//! These run the real binary against stub `hostname`/`pvesh`/`qemu-img`
//! executables placed on a private PATH, asserting the output contract:
//! the chosen identifier is the only thing on stdout, everything else is
//! diagnostics, and exit statuses distinguish failure from cancellation.

use camino::{Utf8Path, Utf8PathBuf};
use std::path::{Path, PathBuf};
use std::process::{Output, Stdio};

use color_eyre::eyre::Context;
use color_eyre::Result;
use indoc::formatdoc;
use libtest_mimic::{Arguments, Trial};
use pvesel::select::{AUTO_PICK_VAR, STORAGE_TARGET_VAR};
use tempfile::TempDir;
use xshell::{cmd, Shell};

// Re-export the registry from lib for internal use
pub(crate) use integration_tests::{IntegrationTest, INTEGRATION_TESTS};
use linkme::distributed_slice;

mod tests {
    pub mod auto_select;
    pub mod env_override;
    pub mod image_sizing;
    pub mod inventory;
}

/// 2^30 bytes, the unit the selector reports free space in.
pub(crate) const GIB: u64 = 1024 * 1024 * 1024;

/// Get the path to the pvesel binary under test.
///
/// PVESEL_PATH wins; otherwise the workspace build output is used when it
/// exists, falling back to whatever PATH provides.
pub(crate) fn get_selector_command() -> Result<String> {
    if let Ok(path) = std::env::var("PVESEL_PATH") {
        return Ok(path);
    }
    let root = Utf8Path::new(env!("CARGO_MANIFEST_DIR"));
    if let Some(path) = ["debug", "release"]
        .into_iter()
        .map(|profile| root.join("../../target").join(profile).join("pvesel"))
        .find(|p| p.exists())
    {
        return Ok(path.into_string());
    }
    Ok("pvesel".to_owned())
}

/// A private PATH directory of stub collaborator executables.
///
/// The selector is run with PATH pointing at only this directory, so a
/// collaborator it was not supposed to need fails loudly by not existing.
/// Stub scripts stick to shell builtins for the same reason.
pub(crate) struct StubTools {
    dir: TempDir,
}

impl StubTools {
    pub fn new() -> Result<Self> {
        Ok(Self {
            dir: TempDir::new()?,
        })
    }

    /// Directory to use as the child's entire PATH.
    pub fn path_dir(&self) -> &Path {
        self.dir.path()
    }

    fn marker_path(&self) -> PathBuf {
        self.dir.path().join("qemu-img.called")
    }

    /// Install an executable stub script named `name`.
    pub fn add_stub(&self, name: &str, body: &str) -> Result<()> {
        use std::os::unix::fs::PermissionsExt;
        let path = self.dir.path().join(name);
        std::fs::write(&path, body).with_context(|| format!("Writing stub {name}"))?;
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755))
            .with_context(|| format!("Marking stub {name} executable"))?;
        Ok(())
    }

    /// Stub `hostname` to report `node`.
    pub fn with_hostname(self, node: &str) -> Result<Self> {
        self.add_stub(
            "hostname",
            &formatdoc! {r#"
                #!/bin/sh
                echo {node}
            "#},
        )?;
        Ok(self)
    }

    /// Stub `pvesh` to serve `payload` for the storage index of `node`
    /// and reject any other query.
    pub fn with_inventory(self, node: &str, payload: &str) -> Result<Self> {
        self.add_stub(
            "pvesh",
            &formatdoc! {r#"
                #!/bin/sh
                [ "$1" = get ] || exit 9
                [ "$2" = /nodes/{node}/storage ] || exit 9
                printf '%s\n' '{payload}'
            "#},
        )?;
        Ok(self)
    }

    /// Stub `pvesh` to fail with `code` and a diagnostic on stderr.
    pub fn with_failing_inventory(self, code: i32) -> Result<Self> {
        self.add_stub(
            "pvesh",
            &formatdoc! {r#"
                #!/bin/sh
                echo 'pvesh: connection refused' >&2
                exit {code}
            "#},
        )?;
        Ok(self)
    }

    /// Stub `qemu-img` to report a virtual size of `bytes`, leaving a
    /// marker file behind so tests can tell whether it was consulted.
    pub fn with_image_size(self, bytes: u64) -> Result<Self> {
        let marker = self.marker_path().display().to_string();
        self.add_stub(
            "qemu-img",
            &formatdoc! {r#"
                #!/bin/sh
                : > '{marker}'
                printf '%s\n' '{{"virtual-size": {bytes}, "format": "qcow2"}}'
            "#},
        )?;
        Ok(self)
    }

    /// Whether the `qemu-img` stub ran at least once.
    pub fn image_size_was_queried(&self) -> bool {
        self.marker_path().exists()
    }
}

/// Captured output from a command with decoded stdout/stderr strings
pub(crate) struct CapturedOutput {
    pub output: Output,
    pub stdout: String,
    pub stderr: String,
}

impl CapturedOutput {
    /// Create from a raw Output
    pub fn new(output: Output) -> Self {
        let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
        let stderr = String::from_utf8_lossy(&output.stderr).into_owned();
        Self {
            output,
            stdout,
            stderr,
        }
    }

    /// Assert that the command succeeded, printing debug info on failure
    pub fn assert_success(&self, context: &str) {
        assert!(
            self.output.status.success(),
            "{} failed: {}",
            context,
            self.stderr
        );
    }

    /// Get the exit code
    pub fn exit_code(&self) -> Option<i32> {
        self.output.status.code()
    }
}

/// Run a command, capturing output
pub(crate) fn run_command(program: &str, args: &[&str]) -> std::io::Result<CapturedOutput> {
    let output = std::process::Command::new(program).args(args).output()?;
    Ok(CapturedOutput::new(output))
}

/// Run the selector with PATH restricted to the stub directory.
///
/// The binary itself is resolved to an absolute path first, since the
/// restricted PATH would otherwise hide it. STORAGE_TARGET and AUTO_PICK
/// are scrubbed from the environment and reintroduced only via `env`;
/// stdin is closed, so runs are non-interactive unless overridden.
pub(crate) fn run_selector(
    stubs: &StubTools,
    image: Option<&str>,
    env: &[(&str, &str)],
) -> Result<CapturedOutput> {
    let selector = get_selector_command()?;
    let selector = if selector.contains('/') {
        Utf8PathBuf::from(selector)
    } else {
        let sh = Shell::new()?;
        let resolved = cmd!(sh, "which {selector}")
            .read()
            .with_context(|| format!("Resolving {selector} on PATH"))?;
        Utf8PathBuf::from(resolved)
    };

    let mut cmd = std::process::Command::new(&selector);
    cmd.env("PATH", stubs.path_dir())
        .env_remove(STORAGE_TARGET_VAR)
        .env_remove(AUTO_PICK_VAR)
        .stdin(Stdio::null());
    for (key, value) in env {
        cmd.env(key, value);
    }
    if let Some(image) = image {
        cmd.arg(image);
    }
    let output = cmd
        .output()
        .with_context(|| format!("Spawning {selector}"))?;
    Ok(CapturedOutput::new(output))
}

#[distributed_slice(INTEGRATION_TESTS)]
static TEST_HELP_SMOKE: IntegrationTest = IntegrationTest::new("help_smoke", test_help_smoke);

fn test_help_smoke() -> Result<()> {
    let selector = get_selector_command()?;
    let output = run_command(&selector, &["--help"])?;
    output.assert_success("pvesel --help");
    assert!(
        output.stdout.contains("IMAGE"),
        "help does not mention the image argument: {}",
        output.stdout
    );
    Ok(())
}

fn main() {
    let args = Arguments::from_args();

    // Collect tests from the distributed slice
    let tests: Vec<Trial> = INTEGRATION_TESTS
        .iter()
        .map(|test| {
            let name = test.name;
            let f = test.f;
            Trial::test(name, move || f().map_err(|e| format!("{:?}", e).into()))
        })
        .collect();

    // Run the tests and exit with the result
    libtest_mimic::run(&args, tests).exit();
}
