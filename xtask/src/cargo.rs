// Licensed under the Apache-2.0 license

//! The cargo invocations CI runs over the workspace.

use crate::PROJECT_ROOT;
use anyhow::{bail, Result};
use std::process::{Command, Stdio};

/// Target the firmware-side crates are built for.
pub(crate) const FIRMWARE_TARGET: &str = "riscv32imc-unknown-none-elf";

/// Crates that run on the device and must build without std.
pub(crate) const FIRMWARE_CRATES: &[&str] = &[
    "dfu-config",
    "dfu-error",
    "flash-storage",
    "dfu-engine",
    "dfu-bootloader",
];

struct Step {
    name: &'static str,
    args: Vec<String>,
    quiet: bool,
    hint: &'static str,
}

impl Step {
    fn new(name: &'static str, args: &[&str]) -> Self {
        Step {
            name,
            args: args.iter().map(|a| a.to_string()).collect(),
            quiet: false,
            hint: "",
        }
    }

    fn quiet(mut self) -> Self {
        self.quiet = true;
        self
    }

    fn hint(mut self, hint: &'static str) -> Self {
        self.hint = hint;
        self
    }

    fn run(&self) -> Result<()> {
        println!("Running: cargo {}", self.args.join(" "));
        let mut cmd = Command::new("cargo");
        cmd.current_dir(&*PROJECT_ROOT).args(&self.args);
        if self.quiet {
            cmd.stdout(Stdio::null());
        }
        if !cmd.status()?.success() {
            bail!("{} failed{}", self.name, self.hint);
        }
        Ok(())
    }
}

pub(crate) fn cargo_lock() -> Result<()> {
    Step::new("lock file check", &["tree", "--locked"])
        .quiet()
        .hint("; commit the Cargo.lock changes")
        .run()
}

pub(crate) fn clippy() -> Result<()> {
    Step::new(
        "clippy",
        &[
            "clippy",
            "--workspace",
            "--all-targets",
            "--all-features",
            "--",
            "-D",
            "warnings",
        ],
    )
    .run()
}

pub(crate) fn format() -> Result<()> {
    Step::new("format check", &["fmt", "--check", "--all"])
        .hint("; run cargo fmt --all")
        .run()
}

/// Host tests, including the simulated-flash integration tests, then the
/// firmware crates for the device target when it is installed.
pub(crate) fn test() -> Result<()> {
    Step::new("tests", &["test", "--workspace", "--all-features"]).run()?;
    if !target_installed(FIRMWARE_TARGET) {
        println!("Skipping {} build: target not installed", FIRMWARE_TARGET);
        return Ok(());
    }
    for krate in FIRMWARE_CRATES {
        Step::new(
            "firmware build",
            &["build", "-p", krate, "--target", FIRMWARE_TARGET],
        )
        .run()?;
    }
    Ok(())
}

fn target_installed(target: &str) -> bool {
    Command::new("rustup")
        .args(["target", "list", "--installed"])
        .output()
        .map(|output| String::from_utf8_lossy(&output.stdout).contains(target))
        .unwrap_or(false)
}
