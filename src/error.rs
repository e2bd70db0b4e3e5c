use nix::errno::Errno;
use thiserror::Error;

pub type ShResult<T> = Result<T, ShError>;

/// Every failure the shell can report. User input errors and per-command
/// system call failures abandon the offending command and the read loop
/// continues; only setup failures are fatal to the shell itself.
#[derive(Debug, Error, PartialEq)]
pub enum ShError {
	// Message text is owned by the caller so bg/fg can report the exact
	// argument the user typed.
	#[error("{0}")]
	UserInput(String),

	#[error("Syntax error: {0}")]
	InvalidSyntax(String),

	#[error("Tried to create too many jobs")]
	JobTableFull,

	#[error("Forking error.")]
	ForkFailed,

	#[error("{0}: Command not found.")]
	CommandNotFound(String),

	#[error("{0}: {1}")]
	Errno(&'static str, Errno),

	#[error("Failed to install signal handlers: {0}")]
	SetupFailed(Errno),

	#[error("Internal error: {0}")]
	Internal(String),
}

impl ShError {
	pub fn is_fatal(&self) -> bool {
		matches!(self, ShError::SetupFailed(..))
	}
}

impl From<Errno> for ShError {
	fn from(errno: Errno) -> Self {
		ShError::Errno("syscall failed", errno)
	}
}

impl From<std::io::Error> for ShError {
	fn from(err: std::io::Error) -> Self {
		ShError::Errno("I/O error", Errno::from_raw(err.raw_os_error().unwrap_or(0)))
	}
}
