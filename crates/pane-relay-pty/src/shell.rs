//! Shell detection for pane sessions.

use std::{
    ffi::OsStr,
    path::{Path, PathBuf},
};

/// Program and arguments used to start a pane's shell.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShellCommand {
    pub program: PathBuf,
    pub args: Vec<String>,
}

/// Returns the interactive shell for the current platform.
///
/// On Windows, prefers PowerShell if available, falling back to cmd.exe.
/// On Unix, uses `$SHELL` started as a login shell so profile `PATH`
/// settings apply.
pub async fn interactive_shell() -> ShellCommand {
    if cfg!(windows) {
        let program = resolve_executable_path("powershell.exe")
            .await
            .unwrap_or_else(|| PathBuf::from("cmd.exe"));
        ShellCommand {
            program,
            args: Vec::new(),
        }
    } else {
        UnixShell::current_shell().into_command()
    }
}

/// Resolve an executable by name.
///
/// Absolute paths are taken as-is when they exist; anything else is
/// looked up on `PATH`.
pub async fn resolve_executable_path(executable: &str) -> Option<PathBuf> {
    if executable.trim().is_empty() {
        return None;
    }

    let path = Path::new(executable);
    if path.is_absolute() && path.is_file() {
        return Some(path.to_path_buf());
    }

    let executable = executable.to_string();
    tokio::task::spawn_blocking(move || which::which(executable))
        .await
        .ok()
        .and_then(Result::ok)
}

/// Unix shell types.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UnixShell {
    Zsh(PathBuf),
    Bash(PathBuf),
    Sh(PathBuf),
    Other(PathBuf),
}

impl UnixShell {
    #[must_use]
    pub fn path(&self) -> &Path {
        match self {
            Self::Zsh(p) | Self::Bash(p) | Self::Sh(p) | Self::Other(p) => p,
        }
    }

    /// Whether this shell accepts `-l`.
    #[must_use]
    pub const fn login(&self) -> bool {
        matches!(self, Self::Zsh(_) | Self::Bash(_))
    }

    /// Get the current shell from `$SHELL`, falling back to `/bin/sh`.
    #[must_use]
    pub fn current_shell() -> Self {
        std::env::var("SHELL")
            .ok()
            .and_then(|shell| Self::from_path(Path::new(&shell)))
            .unwrap_or_else(|| Self::Sh(PathBuf::from("/bin/sh")))
    }

    /// Classify an existing absolute shell path.
    #[must_use]
    pub fn from_path(path: &Path) -> Option<Self> {
        if !(path.is_absolute() && path.is_file()) {
            return None;
        }
        let path_buf = path.to_path_buf();
        let shell = match path.file_name().and_then(OsStr::to_str) {
            Some("zsh") => Self::Zsh(path_buf),
            Some("bash") => Self::Bash(path_buf),
            Some("sh") => Self::Sh(path_buf),
            _ => Self::Other(path_buf),
        };
        Some(shell)
    }

    #[must_use]
    pub fn into_command(self) -> ShellCommand {
        let args = if self.login() {
            vec!["-l".to_string()]
        } else {
            Vec::new()
        };
        let program = match self {
            Self::Zsh(p) | Self::Bash(p) | Self::Sh(p) | Self::Other(p) => p,
        };
        ShellCommand { program, args }
    }
}
