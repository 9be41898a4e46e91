use std::io::{ErrorKind, Write};
use std::process::{Command, Stdio};

use super::{ExecutionMode, ProvisionError};

/// Runs external commands, or prints them when in dry-run mode.
#[derive(Debug, Clone)]
pub struct CommandExecutor {
    mode: ExecutionMode,
}

impl CommandExecutor {
    pub fn new(mode: ExecutionMode) -> Self {
        Self { mode }
    }

    pub fn mode(&self) -> ExecutionMode {
        self.mode
    }

    pub fn is_dry_run(&self) -> bool {
        self.mode.is_dry_run()
    }

    /// Run a command to completion, capturing its output.
    pub fn run(&self, command: &mut Command) -> Result<(), ProvisionError> {
        if self.is_dry_run() {
            self.print_dry_run(command, None);
            return Ok(());
        }

        let output = command
            .stdin(Stdio::null())
            .output()
            .map_err(|source| ProvisionError::io("running", command_line(command), source))?;

        if !output.status.success() {
            return Err(ProvisionError::CommandFailed {
                command: command_line(command),
                status: output.status.code(),
                stderr: combined_output(&output),
            });
        }
        Ok(())
    }

    /// Run a command feeding `input` on stdin. Returns the captured stdout.
    pub fn run_with_input(
        &self,
        command: &mut Command,
        input: &str,
    ) -> Result<Option<String>, ProvisionError> {
        if self.is_dry_run() {
            self.print_dry_run(command, Some(input));
            return Ok(None);
        }

        command
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());

        let mut child = command
            .spawn()
            .map_err(|source| ProvisionError::io("running", command_line(command), source))?;

        if let Some(mut stdin) = child.stdin.take() {
            // A child may exit without reading its input; its status decides.
            if let Err(source) = stdin.write_all(input.as_bytes())
                && source.kind() != ErrorKind::BrokenPipe
            {
                return Err(ProvisionError::io(
                    "writing stdin of",
                    command_line(command),
                    source,
                ));
            }
        }

        let output = child.wait_with_output().map_err(|source| {
            ProvisionError::io("waiting for", command_line(command), source)
        })?;

        if !output.status.success() {
            return Err(ProvisionError::CommandFailed {
                command: command_line(command),
                status: output.status.code(),
                stderr: combined_output(&output),
            });
        }
        Ok(Some(String::from_utf8_lossy(&output.stdout).trim().to_string()))
    }

    /// Describe a filesystem side effect in dry-run mode. Returns true when the
    /// caller must skip the real operation.
    pub fn skip(&self, description: &str) -> bool {
        if self.is_dry_run() {
            println!("[DRY RUN] {}", description);
        }
        self.is_dry_run()
    }

    fn print_dry_run(&self, command: &Command, input: Option<&str>) {
        let cmd_str = command_line(command);

        match input {
            Some(input_str) if input_str.contains('\n') => {
                println!("[DRY RUN] --- BEGIN COMMAND ---");
                println!("> {}", cmd_str);
                println!("{}", input_str.trim());
                println!("[DRY RUN] --- END COMMAND ---");
            }
            Some(input_str) => {
                println!(
                    "[DRY RUN] echo {} | {}",
                    shell_words::quote(input_str),
                    cmd_str
                );
            }
            None => println!("[DRY RUN] {}", cmd_str),
        }
    }
}

/// Shell-quoted rendering of a command, for logs and errors.
pub fn command_line(command: &Command) -> String {
    let program = command.get_program().to_string_lossy().into_owned();
    let args = command.get_args().map(|a| a.to_string_lossy().into_owned());
    shell_words::join(std::iter::once(program).chain(args))
}

fn combined_output(output: &std::process::Output) -> String {
    let stderr = String::from_utf8_lossy(&output.stderr);
    let stdout = String::from_utf8_lossy(&output.stdout);
    let text = if stderr.trim().is_empty() { stdout } else { stderr };
    text.trim().to_string()
}
