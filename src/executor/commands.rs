//! Running delegated external programs.
//!
//! A non-zero exit becomes [`BundleError::ExternalToolFailure`] carrying the
//! combined stdout and stderr, so unattended runs report the tool's own words.
//! A child that dies from the operator's Ctrl-C is an interrupt, not a tool
//! failure.

use std::path::{Path, PathBuf};
use std::process::{Command, ExitStatus};

use tracing::info;

use crate::config::SDK_ROOT_ENV;
use crate::error::{BundleError, Result};
use crate::interrupt;

/// Run `program` with `args` in `cwd`, exporting `env` on top of the
/// inherited environment. The installed-SDK root is never passed through.
pub fn run_command(
    program: &str,
    args: &[String],
    cwd: &Path,
    env: &[(&str, &Path)],
) -> Result<()> {
    info!(program, args = ?args, cwd = %cwd.display(), "running");

    let mut command = Command::new(program_path(program, cwd));
    command.args(args).current_dir(cwd).env_remove(SDK_ROOT_ENV);
    for (key, value) in env {
        command.env(key, value);
    }

    let output = command
        .output()
        .map_err(|e| BundleError::ExternalToolFailure {
            program: program.to_string(),
            status: "spawn error".to_string(),
            output: e.to_string(),
        })?;

    if output.status.success() {
        return Ok(());
    }
    interrupt::check()?;
    if killed_by_sigint(&output.status) {
        return Err(BundleError::Interrupted);
    }

    let stdout = String::from_utf8_lossy(&output.stdout);
    let stderr = String::from_utf8_lossy(&output.stderr);
    Err(BundleError::ExternalToolFailure {
        program: program.to_string(),
        status: output.status.to_string(),
        output: format!("{}{}", stdout, stderr),
    })
}

/// Relative paths with a separator are taken from `cwd`; bare names go
/// through `PATH`.
fn program_path(program: &str, cwd: &Path) -> PathBuf {
    let path = Path::new(program);
    if path.is_relative() && path.components().count() > 1 {
        cwd.join(path)
    } else {
        path.to_path_buf()
    }
}

#[cfg(unix)]
fn killed_by_sigint(status: &ExitStatus) -> bool {
    use std::os::unix::process::ExitStatusExt;
    status.signal() == Some(libc::SIGINT)
}

#[cfg(not(unix))]
fn killed_by_sigint(_status: &ExitStatus) -> bool {
    false
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn successful_command_is_ok() {
        let temp = TempDir::new().unwrap();
        run_command("true", &[], temp.path(), &[]).unwrap();
    }

    #[test]
    fn failing_command_reports_status_and_output() {
        let temp = TempDir::new().unwrap();
        let args = vec!["-c".to_string(), "echo broken >&2; exit 3".to_string()];
        let err = run_command("sh", &args, temp.path(), &[]).unwrap_err();
        match err {
            BundleError::ExternalToolFailure { program, output, .. } => {
                assert_eq!(program, "sh");
                assert!(output.contains("broken"));
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn exported_env_is_visible_to_child() {
        let temp = TempDir::new().unwrap();
        let marker = temp.path().join("seen");
        let args = vec![
            "-c".to_string(),
            format!("test \"$BUNDLE_DIR\" = '{}' && touch seen", temp.path().display()),
        ];
        run_command("sh", &args, temp.path(), &[("BUNDLE_DIR", temp.path())]).unwrap();
        assert!(marker.exists());
    }

    #[cfg(unix)]
    #[test]
    fn child_killed_by_sigint_is_an_interrupt() {
        let temp = TempDir::new().unwrap();
        let args = vec!["-c".to_string(), "kill -INT $$".to_string()];
        let err = run_command("sh", &args, temp.path(), &[]).unwrap_err();
        assert!(err.is_interrupted(), "{err:?}");
    }

    #[cfg(unix)]
    #[test]
    fn relative_program_runs_from_cwd() {
        use std::os::unix::fs::PermissionsExt;

        let temp = TempDir::new().unwrap();
        let script = temp.path().join("gen.sh");
        std::fs::write(&script, "#!/bin/sh\ntouch generated\n").unwrap();
        std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o755)).unwrap();

        run_command("./gen.sh", &[], temp.path(), &[]).unwrap();
        assert!(temp.path().join("generated").exists());
    }

    #[test]
    fn relative_program_paths_are_taken_from_cwd() {
        let cwd = Path::new("/work");
        assert_eq!(program_path("make", cwd), PathBuf::from("make"));
        assert_eq!(program_path("./gen.sh", cwd), PathBuf::from("/work/./gen.sh"));
        assert_eq!(program_path("scripts/gen.sh", cwd), PathBuf::from("/work/scripts/gen.sh"));
        assert_eq!(program_path("/bin/sh", cwd), PathBuf::from("/bin/sh"));
    }

    #[test]
    fn missing_program_is_a_tool_failure() {
        let temp = TempDir::new().unwrap();
        let err = run_command("definitely_not_a_real_command_12345", &[], temp.path(), &[])
            .unwrap_err();
        assert!(matches!(err, BundleError::ExternalToolFailure { .. }));
    }
}
