use crate::{prelude::*, signal};

/// A resolved `bg`/`fg` argument: `%<digits>` names a job id, bare digits
/// name a process id.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobTarget {
	Jid(usize),
	Pid(Pid),
}

/// Syntax-check the argument before any table lookup happens, so a
/// malformed argument is always reported as malformed rather than as a
/// missing job.
pub fn parse_target(cmd: &str, arg: Option<&str>) -> ShResult<JobTarget> {
	let arg = arg.ok_or_else(|| {
		ShError::UserInput(format!("{}: command requires PID or %jid argument", cmd))
	})?;
	let malformed = || ShError::UserInput(format!("{}: argument must be a PID or %jid", cmd));

	if let Some(digits) = arg.strip_prefix('%') {
		if digits.is_empty() || !digits.chars().all(|ch| ch.is_ascii_digit()) {
			return Err(malformed());
		}
		Ok(JobTarget::Jid(digits.parse::<usize>().map_err(|_| malformed())?))
	} else {
		if arg.is_empty() || !arg.chars().all(|ch| ch.is_ascii_digit()) {
			return Err(malformed());
		}
		let pid = arg.parse::<i32>().map_err(|_| malformed())?;
		Ok(JobTarget::Pid(Pid::from_raw(pid)))
	}
}

fn no_such_target(target: JobTarget) -> ShError {
	match target {
		JobTarget::Jid(jid) => ShError::UserInput(format!("%{}: No such job", jid)),
		JobTarget::Pid(pid) => ShError::UserInput(format!("({}): No such process", pid)),
	}
}

/// `bg <target>` / `fg <target>`: resume a job in the background, or pull
/// it into the foreground and wait on it.
///
/// The continue signal goes to the whole process group so every stage of a
/// stopped pipeline wakes up. The lookup and state change run with the job
/// signals blocked; otherwise a reaping could interleave with this
/// read-then-write.
pub fn continue_job(tokens: &[String], fg: bool) -> ShResult<()> {
	let target = parse_target(&tokens[0], tokens.get(1).map(|tk| tk.as_str()))?;

	let prev = signal::block_sigmask(&signal::job_sigmask())?;
	let outcome = write_jobs(|j| {
		let job = match target {
			JobTarget::Jid(jid) => j.get_by_jid_mut(jid),
			JobTarget::Pid(pid) => j.get_by_pid_mut(pid),
		};
		let Some(job) = job else {
			return Err(no_such_target(target));
		};

		if fg {
			match job.state() {
				JobState::Stopped | JobState::Background => {
					job.set_state(JobState::Foreground);
					let _ = job.killpg(Signal::SIGCONT);
				}
				JobState::Foreground => {}
			}
			Ok((job.pgid(), None))
		} else {
			if job.state() == JobState::Stopped {
				job.set_state(JobState::Background);
				let _ = job.killpg(Signal::SIGCONT);
			}
			// Announced whether or not a transition happened.
			let line = format!("[{}] ({}) {}", job.jid(), job.pgid(), job.cmdline());
			Ok((job.pgid(), Some(line)))
		}
	});
	signal::restore_sigmask(&prev)?;

	match outcome? {
		(pgid, None) => signal::waitfg(pgid),
		(_, Some(line)) => {
			print!("{}", line);
			let _ = io::stdout().flush();
			Ok(())
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn missing_argument_is_reported_per_command() {
		let err = parse_target("bg", None).unwrap_err();
		assert_eq!(err, ShError::UserInput("bg: command requires PID or %jid argument".into()));
		let err = parse_target("fg", None).unwrap_err();
		assert_eq!(err, ShError::UserInput("fg: command requires PID or %jid argument".into()));
	}

	#[test]
	fn jid_and_pid_forms_resolve() {
		assert_eq!(parse_target("fg", Some("%3")).unwrap(), JobTarget::Jid(3));
		assert_eq!(parse_target("bg", Some("1234")).unwrap(), JobTarget::Pid(Pid::from_raw(1234)));
	}

	#[test]
	fn malformed_arguments_fail_before_any_lookup() {
		// These would also fail lookup, but the syntax message must win.
		for arg in ["abc", "%abc", "%", "12a", "%1x", "-4"] {
			let err = parse_target("bg", Some(arg)).unwrap_err();
			assert_eq!(err, ShError::UserInput("bg: argument must be a PID or %jid".into()), "arg {:?}", arg);
		}
	}
}
