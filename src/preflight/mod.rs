//! Preflight checks run before the bundle tree is touched.
//!
//! Every hook program that the run will execute must resolve on `PATH`, or
//! relative to the hook's working directory when it names a path. Catching
//! this up front avoids clobbering a tree only to fail halfway through
//! population.

use std::env;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::config::file::HookSpec;
use crate::config::BuildConfig;
use crate::error::{BundleError, Result};

/// Locate `program` the way a hook started in `cwd` would find it.
pub fn find_program(program: &str, cwd: &Path) -> Option<PathBuf> {
    which::which_in(program, env::var_os("PATH"), cwd).ok()
}

/// Check that all programs are available, reporting every missing one at once.
///
/// Items are `(owner, program, cwd)`.
pub fn check_required_programs<'a, I>(programs: I) -> Result<()>
where
    I: IntoIterator<Item = (&'a str, &'a str, &'a Path)>,
{
    let mut missing = Vec::new();
    for (owner, program, cwd) in programs {
        match find_program(program, cwd) {
            Some(path) => debug!(program, path = %path.display(), "found"),
            None => missing.push(format!("  {program} (needed by {owner})")),
        }
    }

    if missing.is_empty() {
        return Ok(());
    }
    Err(BundleError::Config(format!(
        "missing required programs:\n{}",
        missing.join("\n")
    )))
}

/// Check the programs of every hook active for `config`.
pub fn check_hooks<'a, I>(hooks: I, config: &BuildConfig) -> Result<()>
where
    I: IntoIterator<Item = &'a HookSpec>,
{
    check_required_programs(
        hooks
            .into_iter()
            .filter(|hook| hook.when.eval(config))
            .map(|hook| (hook.name.as_str(), hook.program.as_str(), hook.cwd.as_path())),
    )
}
