//! Privileged command execution

/// Runs shell commands with elevated privileges.
///
/// Implementations block the calling thread until the elevated shell exits,
/// so async callers must move the call onto a blocking worker.
pub trait PrivilegedExecutor: Send + Sync {
    /// Run `commands` in order in a single elevated shell.
    ///
    /// Returns true only if the shell exited with status zero.
    fn exec(&self, commands: &[String]) -> bool;
}
