//! Privileged command execution through an elevated shell
//!
//! One shell process is spawned per call. Commands are written to its
//! standard input one per line, followed by `exit`. The shell's standard
//! input is always closed and the process always killed and reaped before
//! [`Root::exec`] returns, whichever step failed.

use std::io::{self, BufWriter, Write};
use std::process::{Child, Command, ExitStatus, Stdio};

use tp_core::config::RootConfig;
use tp_core::traits::PrivilegedExecutor;

/// Runs commands in a root shell (`su` unless configured otherwise)
#[derive(Debug, Clone)]
pub struct Root {
    shell: String,
}

impl Root {
    /// Create an executor using `shell` to obtain privileges
    pub fn new(shell: impl Into<String>) -> Self {
        Self {
            shell: shell.into(),
        }
    }

    /// Create an executor from configuration
    pub fn from_config(config: &RootConfig) -> Self {
        Self::new(config.shell.clone())
    }

    /// The program used to open the elevated shell
    pub fn shell(&self) -> &str {
        &self.shell
    }
}

impl Default for Root {
    fn default() -> Self {
        Self::from_config(&RootConfig::default())
    }
}

impl PrivilegedExecutor for Root {
    fn exec(&self, commands: &[String]) -> bool {
        let mut child = match Command::new(&self.shell)
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
        {
            Ok(child) => child,
            Err(e) => {
                tracing::error!("Root exec error: failed to spawn '{}': {}", self.shell, e);
                return false;
            }
        };

        let outcome = run_script(&mut child, commands);

        drop(child.stdin.take());
        let _ = child.kill();
        let _ = child.wait();

        match outcome {
            Ok(status) => {
                tracing::debug!("Root shell exited with {}", status);
                status.code() == Some(0)
            }
            Err(e) => {
                tracing::error!("Root exec error: {}", e);
                false
            }
        }
    }
}

fn run_script(child: &mut Child, commands: &[String]) -> io::Result<ExitStatus> {
    {
        let stdin = child
            .stdin
            .as_mut()
            .ok_or_else(|| io::Error::new(io::ErrorKind::BrokenPipe, "shell stdin not captured"))?;
        let mut writer = BufWriter::new(stdin);

        for command in commands {
            tracing::debug!("root$ {}", command);
            writer.write_all(command.as_bytes())?;
            writer.write_all(b"\n")?;
        }
        writer.write_all(b"exit\n")?;
        writer.flush()?;
    }

    // EOF lets the shell finish even if `exit` was swallowed by a command
    drop(child.stdin.take());
    child.wait()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sh() -> Root {
        Root::new("sh")
    }

    fn cmds(commands: &[&str]) -> Vec<String> {
        commands.iter().map(|c| c.to_string()).collect()
    }

    #[test]
    fn test_zero_exit_is_success() {
        assert!(sh().exec(&cmds(&["true", "echo ok"])));
    }

    #[test]
    fn test_non_zero_exit_is_failure() {
        assert!(!sh().exec(&cmds(&["exit 3"])));
    }

    #[test]
    fn test_failed_command_followed_by_exit_still_exits_zero() {
        // `exit` with no argument reports the last command's status
        assert!(!sh().exec(&cmds(&["false"])));
        assert!(sh().exec(&cmds(&["false", "true"])));
    }

    #[test]
    fn test_empty_command_list() {
        assert!(sh().exec(&[]));
    }

    #[test]
    fn test_missing_shell_is_failure() {
        let root = Root::new("/nonexistent/definitely-not-a-shell");
        assert!(!root.exec(&cmds(&["true"])));
    }

    #[test]
    fn test_stdin_is_closed() {
        // `cat` reads the rest of the script and would hang without EOF
        assert!(sh().exec(&cmds(&["cat"])));
    }

    #[test]
    fn test_repeated_calls_release_processes() {
        let root = sh();
        for i in 0..64 {
            let expect_ok = i % 2 == 0;
            let script = if expect_ok { "true" } else { "exit 1" };
            assert_eq!(root.exec(&cmds(&[script])), expect_ok);
        }
    }

    #[test]
    fn test_default_shell_is_su() {
        assert_eq!(Root::default().shell(), "su");
    }
}
