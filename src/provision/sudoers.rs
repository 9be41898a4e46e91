use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::process::Command;

use crate::ui::prelude::*;

use super::{CommandExecutor, ProvisionError};

const FRAGMENT_MODE: u32 = 0o440;

pub fn fragment_path(sudoers_dir: &Path, name: &str) -> PathBuf {
    sudoers_dir.join(name)
}

/// Check a sudoers line with `visudo -c -f -` before anything is written.
pub fn validate(
    visudo: &Path,
    line: &str,
    executor: &CommandExecutor,
) -> Result<(), ProvisionError> {
    let mut cmd = Command::new(visudo);
    cmd.args(["-c", "-f", "-"]);

    let input = format!("{line}\n");
    match executor.run_with_input(&mut cmd, &input) {
        Ok(Some(output)) => {
            emit(
                Level::Debug,
                "provision.sudo.validated",
                &format!("visudo accepted '{}': {}", line, output),
                None,
            );
            Ok(())
        }
        Ok(None) => Ok(()),
        Err(ProvisionError::CommandFailed { stderr, .. }) => {
            Err(ProvisionError::SudoersValidation {
                line: line.to_string(),
                output: stderr,
            })
        }
        Err(err) => Err(err),
    }
}

/// Write the fragment file, replacing any previous content, with mode 0440.
pub fn write_fragment(
    sudoers_dir: &Path,
    name: &str,
    line: &str,
    executor: &CommandExecutor,
) -> Result<PathBuf, ProvisionError> {
    let path = fragment_path(sudoers_dir, name);
    if executor.skip(&format!("write '{}' to {} (mode 0440)", line, path.display())) {
        return Ok(path);
    }

    fs::write(&path, format!("{line}\n"))
        .map_err(|err| ProvisionError::io("writing", &path, err))?;
    fs::set_permissions(&path, fs::Permissions::from_mode(FRAGMENT_MODE))
        .map_err(|err| ProvisionError::io("setting permissions on", &path, err))?;

    Ok(path)
}
