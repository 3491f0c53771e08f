// Licensed under the Apache-2.0 license

use crate::{cargo, deps, header};
use anyhow::Result;

pub(crate) fn precheckin() -> Result<()> {
    cargo::cargo_lock()?;
    cargo::format()?;
    header::check()?;
    deps::check()?;
    cargo::clippy()?;
    cargo::test()
}
