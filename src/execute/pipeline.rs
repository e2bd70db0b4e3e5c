use crate::{prelude::*, signal, token};

use super::command;

/// Launch a `|`-chained sequence of commands as one logical job.
///
/// Every stage joins the first stage's process group, so the whole pipeline
/// is targeted by one jid/pgid pair: one table entry, one foreground wait,
/// one background announcement, and retirement only after every stage has
/// been reaped.
pub fn exec_pipeline(tokens: &[String], cmdline: &str) -> ShResult<()> {
	let background = token::is_background(tokens);
	let stages = split_stages(tokens, background)?;

	let prev = signal::block_sigmask(&signal::launch_sigmask())?;
	if read_jobs(|j| j.is_full()) {
		signal::restore_sigmask(&prev)?;
		return Err(ShError::JobTableFull);
	}

	let mut prev_read: Option<OwnedFd> = None;
	let mut pgid: Option<Pid> = None;
	let mut children = vec![];

	for (k, stage) in stages.iter().enumerate() {
		let last = k == stages.len() - 1;
		let (r_pipe, w_pipe) = if last {
			(None, None)
		} else {
			match pipe() {
				Ok((r, w)) => (Some(r), Some(w)),
				Err(e) => {
					let _ = signal::restore_sigmask(&prev);
					return Err(ShError::Errno("Piping error", e));
				}
			}
		};

		match unsafe { fork() } {
			Ok(ForkResult::Child) => {
				let _ = signal::restore_sigmask(&prev);
				let group = pgid.unwrap_or(Pid::from_raw(0));
				let _ = setpgid(Pid::from_raw(0), group);
				if pgid.is_none() {
					// First stage: its pid becomes the group, tell the parent.
					let _ = kill(getppid(), Signal::SIGUSR1);
				}
				exec_stage(stage, prev_read, r_pipe, w_pipe);
			}
			Ok(ForkResult::Parent { child }) => {
				if pgid.is_none() {
					signal::wait_child_ready(child);
					pgid = Some(child);
				}
				let _ = setpgid(child, pgid.unwrap_or(child));
				children.push(ChildProc::new(child));
				drop(w_pipe); // This stage's write end belongs to the child only
				prev_read = r_pipe; // Dropping the old read end closes it
			}
			Err(_) => {
				let _ = signal::restore_sigmask(&prev);
				return Err(ShError::ForkFailed);
			}
		}
	}
	drop(prev_read);

	let pgid = pgid.ok_or_else(|| ShError::Internal("pipeline launched no processes".into()))?;
	let state = if background { JobState::Background } else { JobState::Foreground };
	let job = JobBuilder::new()
		.with_pgid(pgid)
		.with_state(state)
		.with_cmdline(cmdline)
		.with_children(children)
		.build();
	let added = write_jobs(|j| j.add_job(job));
	// Stages reaped during the readiness wait were parked in the pending
	// buffer; settle them before reporting on the job.
	let finished = match &added {
		Ok(_) => write_jobs(|j| j.settle_pending(pgid)),
		Err(_) => None,
	};

	signal::restore_sigmask(&prev)?;
	signal::rearm_job_signals()?;

	let jid = added?;
	if let Some(fatal) = finished {
		if fatal.is_some() {
			println!("Job [{}] ({}) terminated by signal 2", jid, pgid);
		}
	} else if background {
		print!("[{}] ({}) {}", jid, pgid, cmdline);
		let _ = io::stdout().flush();
	} else {
		signal::waitfg(pgid)?;
	}
	Ok(())
}

/// Split the token sequence into per-stage argument vectors on `|`,
/// dropping a trailing background marker first.
pub fn split_stages(tokens: &[String], background: bool) -> ShResult<Vec<Vec<String>>> {
	let tokens = if background { &tokens[..tokens.len() - 1] } else { tokens };
	let stages = tokens
		.split(|tk| tk == "|")
		.map(|stage| stage.to_vec())
		.collect::<Vec<_>>();
	if stages.iter().any(|stage| stage.is_empty()) {
		return Err(ShError::InvalidSyntax("missing command in pipeline".into()));
	}
	Ok(stages)
}

/// Child side of one stage: wire the neighboring pipes onto stdin/stdout,
/// close everything this stage does not use, then exec. Never returns.
fn exec_stage(
	argv: &[String],
	prev_read: Option<OwnedFd>,
	r_pipe: Option<OwnedFd>,
	w_pipe: Option<OwnedFd>,
) -> ! {
	drop(r_pipe); // The next stage's stdin, not ours

	if let Some(w) = &w_pipe {
		if let Err(e) = dup2(w.as_raw_fd(), STDOUT_FILENO) {
			println!("{}", ShError::Errno("Piping error", e));
			std::process::exit(1);
		}
	}
	if let Some(r) = &prev_read {
		if let Err(e) = dup2(r.as_raw_fd(), STDIN_FILENO) {
			println!("{}", ShError::Errno("Piping error", e));
			std::process::exit(1);
		}
	}
	drop(w_pipe);
	drop(prev_read);

	command::exec_external(argv);
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::token::tokenize;

	#[test]
	fn splits_stages_in_order() {
		let tokens = tokenize("a -x | b | c -y\n");
		let stages = split_stages(&tokens, false).unwrap();
		assert_eq!(stages.len(), 3);
		assert_eq!(stages[0], ["a", "-x"]);
		assert_eq!(stages[1], ["b"]);
		assert_eq!(stages[2], ["c", "-y"]);
	}

	#[test]
	fn background_marker_is_stripped_from_last_stage() {
		let tokens = tokenize("a | b &\n");
		assert!(crate::token::is_background(&tokens));
		let stages = split_stages(&tokens, true).unwrap();
		assert_eq!(stages, vec![vec!["a".to_string()], vec!["b".to_string()]]);
	}

	#[test]
	fn empty_stage_is_rejected() {
		let tokens = tokenize("a | | b\n");
		assert!(split_stages(&tokens, false).is_err());
		let tokens = tokenize("| a\n");
		assert!(split_stages(&tokens, false).is_err());
	}
}
