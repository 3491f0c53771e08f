// Licensed under the Apache-2.0 license

use crate::PROJECT_ROOT;
use anyhow::{bail, Context, Result};
use std::path::{Path, PathBuf};
use toml::{Table, Value};

const IGNORE_DIRS: &[&str] = &["examples", "target"];

/// Every crate must take its dependencies from the workspace table so that
/// versions and features are decided in one place.
pub(crate) fn check() -> Result<()> {
    let mut okay = true;
    for toml_path in find_cargo_tomls(&PROJECT_ROOT)? {
        let data = std::fs::read_to_string(&toml_path)?;
        let manifest = data
            .parse::<Table>()
            .with_context(|| format!("parsing {}", toml_path.display()))?;
        let bad = non_workspace_deps(&manifest);
        if bad.is_empty() {
            continue;
        }
        okay = false;
        println!("Checking dependencies in {}", toml_path.display());
        for (name, value) in bad {
            println!(
                "  dependency {} should be {}.workspace = true but was {} = {}",
                name, name, name, value
            );
        }
    }
    if !okay {
        bail!("Dependency check failed");
    }
    Ok(())
}

fn non_workspace_deps(manifest: &Table) -> Vec<(String, Value)> {
    let mut bad = vec![];
    for section in ["dependencies", "dev-dependencies", "build-dependencies"] {
        let Some(deps) = manifest.get(section).and_then(Value::as_table) else {
            continue;
        };
        for (name, value) in deps {
            let from_workspace = value
                .as_table()
                .and_then(|t| t.get("workspace"))
                .and_then(Value::as_bool)
                .unwrap_or(false);
            if !from_workspace {
                bad.push((name.clone(), value.clone()));
            }
        }
    }
    bad
}

fn find_cargo_tomls(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut result = vec![];
    let walker = walkdir::WalkDir::new(dir).into_iter().filter_entry(|e| {
        !e.file_name()
            .to_str()
            .is_some_and(|name| IGNORE_DIRS.contains(&name))
    });
    for entry in walker {
        let entry = entry?;
        if entry.file_name() == "Cargo.toml" {
            result.push(entry.into_path());
        }
    }
    result.sort();
    Ok(result)
}
