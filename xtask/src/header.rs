// Licensed under the Apache-2.0 license

//! License header check for the workspace sources and manifests.

use crate::PROJECT_ROOT;
use anyhow::{bail, Context, Result};
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

const HEADER: &str = "Licensed under the Apache-2.0 license";

/// The header has to appear within this many leading lines. Files opening
/// with a `/*++` block carry it on the third line.
const HEADER_WINDOW: usize = 3;

/// Directories never scanned: build output and vendored reference trees.
const SKIPPED_DIRS: &[&str] = &[".git", "examples", "target"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Syntax {
    Rust,
    Toml,
}

impl Syntax {
    fn of(path: &Path) -> Option<Self> {
        match path.extension()?.to_str()? {
            "rs" => Some(Syntax::Rust),
            "toml" => Some(Syntax::Toml),
            _ => None,
        }
    }

    fn header_line(self) -> String {
        match self {
            Syntax::Rust => format!("// {HEADER}\n"),
            Syntax::Toml => format!("# {HEADER}\n"),
        }
    }
}

fn has_header(contents: &str) -> bool {
    contents
        .lines()
        .take(HEADER_WINDOW)
        .any(|line| line.contains(HEADER))
}

fn with_header(syntax: Syntax, contents: &str) -> String {
    let mut fixed = syntax.header_line();
    if !contents.starts_with('\n') {
        fixed.push('\n');
    }
    fixed.push_str(contents);
    fixed
}

fn relative(path: &Path) -> &Path {
    path.strip_prefix(&*PROJECT_ROOT).unwrap_or(path)
}

/// Files under `root` that are expected to carry the header.
fn source_files(root: &Path) -> Result<Vec<PathBuf>> {
    let walker = WalkDir::new(root).into_iter().filter_entry(|entry| {
        !(entry.file_type().is_dir()
            && entry
                .file_name()
                .to_str()
                .is_some_and(|name| SKIPPED_DIRS.contains(&name)))
    });
    let mut files = vec![];
    for entry in walker {
        let entry = entry?;
        if entry.file_type().is_file() && Syntax::of(entry.path()).is_some() {
            files.push(entry.into_path());
        }
    }
    files.sort();
    Ok(files)
}

fn missing_header(root: &Path) -> Result<Vec<PathBuf>> {
    let mut missing = vec![];
    for file in source_files(root)? {
        let contents = std::fs::read_to_string(&file)
            .with_context(|| format!("reading {}", relative(&file).display()))?;
        if !has_header(&contents) {
            missing.push(file);
        }
    }
    Ok(missing)
}

pub(crate) fn check() -> Result<()> {
    println!("Running: license header check");
    let missing = missing_header(&PROJECT_ROOT)?;
    for file in &missing {
        println!("Missing license header: {}", relative(file).display());
    }
    if !missing.is_empty() {
        bail!("{} files lack the license header; run \"cargo xtask header-fix\"", missing.len());
    }
    Ok(())
}

pub(crate) fn fix() -> Result<()> {
    println!("Running: license header fix");
    for file in missing_header(&PROJECT_ROOT)? {
        let Some(syntax) = Syntax::of(&file) else {
            continue;
        };
        let contents = std::fs::read_to_string(&file)?;
        std::fs::write(&file, with_header(syntax, &contents))?;
        println!("Added license header to {}", relative(&file).display());
    }
    check()
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_header_window() {
        assert!(has_header("// Licensed under the Apache-2.0 license\n"));
        assert!(has_header("/*++\n\nLicensed under the Apache-2.0 license.\n\nFile Name:\n"));
        assert!(!has_header("fn main() {}\n\n\n// Licensed under the Apache-2.0 license\n"));
        assert!(!has_header(""));
    }

    #[test]
    fn test_fix_prepends_matching_comment() {
        assert_eq!(
            with_header(Syntax::Toml, "[package]\n"),
            "# Licensed under the Apache-2.0 license\n\n[package]\n"
        );
        assert_eq!(
            with_header(Syntax::Rust, "\nmod a;\n"),
            "// Licensed under the Apache-2.0 license\n\nmod a;\n"
        );
        assert!(has_header(&with_header(Syntax::Rust, "fn f() {}\n")));
    }

    #[test]
    fn test_scan_skips_build_output_and_other_files() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("target/debug")).unwrap();
        std::fs::create_dir_all(dir.path().join("src")).unwrap();
        std::fs::write(dir.path().join("target/debug/gen.rs"), "").unwrap();
        std::fs::write(dir.path().join("src/lib.rs"), "").unwrap();
        std::fs::write(
            dir.path().join("Cargo.toml"),
            "# Licensed under the Apache-2.0 license\n",
        )
        .unwrap();
        std::fs::write(dir.path().join("README.md"), "").unwrap();

        assert_eq!(
            source_files(dir.path()).unwrap(),
            vec![dir.path().join("Cargo.toml"), dir.path().join("src/lib.rs")]
        );
        assert_eq!(
            missing_header(dir.path()).unwrap(),
            vec![dir.path().join("src/lib.rs")]
        );
    }
}
