pub use std::{
	env,
	ffi::CString,
	io::{
		self,
		Write
	},
	os::fd::{
		AsRawFd,
		OwnedFd,
		RawFd
	},
	sync::atomic::{
		AtomicBool,
		Ordering
	}
};

pub use libc::{
	STDIN_FILENO,
	STDOUT_FILENO,
	STDERR_FILENO
};
pub use nix::{
	errno::Errno,
	fcntl::{
		open,
		OFlag
	}, sys::{
		signal::{
			kill,
			killpg,
			sigprocmask,
			SigSet,
			SigmaskHow,
			Signal
		}, stat::Mode,
		wait::{
			waitpid,
			WaitPidFlag,
			WaitStatus
		}
	}, unistd::{
		close,
		dup2,
		execvpe,
		fork,
		getppid,
		pipe,
		setpgid,
		ForkResult,
		Pid
	}
};
pub use crate::{
	error::{
		ShError,
		ShResult
	},
	jobs::{
		read_jobs,
		write_jobs,
		ChildProc,
		Job,
		JobBuilder,
		JobState,
		MAX_JOBS
	}
};
