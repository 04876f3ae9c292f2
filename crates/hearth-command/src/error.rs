use hearth_effector::{CommandOutput, SshError};
use thiserror::Error;

/// Failure taxonomy by origin, shared by every commander operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandErrorKind {
    Authentication,
    SudoPasswordRequired,
    ConnectionRefused,
    Dns,
    Timeout,
    Parse,
    Unsupported,
    SystemTypeMismatch,
    Generic,
}

impl std::fmt::Display for CommandErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            CommandErrorKind::Authentication => "authentication",
            CommandErrorKind::SudoPasswordRequired => "sudo_password_required",
            CommandErrorKind::ConnectionRefused => "connection_refused",
            CommandErrorKind::Dns => "dns",
            CommandErrorKind::Timeout => "timeout",
            CommandErrorKind::Parse => "parse",
            CommandErrorKind::Unsupported => "unsupported",
            CommandErrorKind::SystemTypeMismatch => "system_type_mismatch",
            CommandErrorKind::Generic => "generic",
        };
        write!(f, "{}", s)
    }
}

#[derive(Debug, Clone, Error)]
#[error("{kind}: {message} (command: {command})")]
pub struct CommandError {
    pub kind: CommandErrorKind,
    pub message: String,
    /// The command string that was (or would have been) run.
    pub command: String,
    /// Raw output kept for diagnosis; empty when the failure predates I/O.
    pub raw_output: String,
}

impl CommandError {
    pub fn new(
        kind: CommandErrorKind,
        message: impl Into<String>,
        command: impl Into<String>,
        raw_output: impl Into<String>,
    ) -> Self {
        CommandError {
            kind,
            message: message.into(),
            command: command.into(),
            raw_output: raw_output.into(),
        }
    }

    pub fn parse(command: impl Into<String>, raw: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(CommandErrorKind::Parse, message, command, raw)
    }

    pub fn unsupported(command: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(CommandErrorKind::Unsupported, message, command, "")
    }

    pub fn mismatch(message: impl Into<String>) -> Self {
        Self::new(CommandErrorKind::SystemTypeMismatch, message, "", "")
    }

    /// Lift a transport failure into the command taxonomy.
    pub fn from_ssh(err: SshError, command: impl Into<String>) -> Self {
        let kind = match &err {
            SshError::Auth { .. } => CommandErrorKind::Authentication,
            SshError::Timeout { .. } => CommandErrorKind::Timeout,
            SshError::Refused { .. } => CommandErrorKind::ConnectionRefused,
            SshError::Dns { .. } => CommandErrorKind::Dns,
            SshError::Transport { .. } => CommandErrorKind::Generic,
        };
        Self::new(kind, err.to_string(), command, "")
    }

    /// Recognize well-known failure text in a non-zero exit.
    pub fn classify_output(command: &str, output: &CommandOutput) -> Self {
        let stderr = output.stderr.to_lowercase();
        let kind = if stderr.contains("a password is required")
            || stderr.contains("password is required")
            || stderr.contains("sudo: no tty present")
        {
            CommandErrorKind::SudoPasswordRequired
        } else if stderr.contains("permission denied") {
            CommandErrorKind::Authentication
        } else if stderr.contains("command not found") || stderr.contains("not recognized") {
            CommandErrorKind::Unsupported
        } else {
            CommandErrorKind::Generic
        };
        let message = match kind {
            CommandErrorKind::SudoPasswordRequired => "sudo password required".to_string(),
            _ => format!("command exited with status {}", output.exit_code),
        };
        Self::new(
            kind,
            message,
            command,
            format!("{}{}", output.stdout, output.stderr),
        )
    }
}
