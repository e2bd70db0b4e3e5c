use crate::{prelude::*, signal, token};

use super::redirect;

/// Launch one external command as a new job.
///
/// The job-control signals (plus SIGUSR1 for the readiness protocol) are
/// blocked before the fork and stay blocked in the parent until the job is
/// in the table, so a child's first status change can never arrive before
/// the job it concerns exists.
pub fn exec_cmd(tokens: &[String], cmdline: &str) -> ShResult<()> {
	let background = token::is_background(tokens);
	let mut argv = tokens.to_vec();
	if background {
		argv.pop();
	}
	if argv.is_empty() {
		return Ok(());
	}

	let prev = signal::block_sigmask(&signal::launch_sigmask())?;

	// Rejecting a full table up front keeps a process from ever running
	// outside the registry. Nothing can free or claim a slot while the
	// signals are blocked.
	if read_jobs(|j| j.is_full()) {
		signal::restore_sigmask(&prev)?;
		return Err(ShError::JobTableFull);
	}

	match unsafe { fork() } {
		Ok(ForkResult::Child) => {
			let _ = signal::restore_sigmask(&prev);
			let _ = setpgid(Pid::from_raw(0), Pid::from_raw(0));
			let _ = kill(getppid(), Signal::SIGUSR1);
			match redirect::scan(&argv).and_then(|(argv, redirs)| {
				redirect::apply(&redirs)?;
				Ok(argv)
			}) {
				Ok(argv) => exec_external(&argv),
				Err(e) => {
					println!("{}", e);
					std::process::exit(1);
				}
			}
		}
		Ok(ForkResult::Parent { child }) => {
			signal::wait_child_ready(child);
			// Idempotent with the child's own setpgid call; whichever side
			// runs second is a no-op.
			let _ = setpgid(child, child);

			let state = if background { JobState::Background } else { JobState::Foreground };
			let job = JobBuilder::new()
				.with_pgid(child)
				.with_state(state)
				.with_cmdline(cmdline)
				.build();
			let added = write_jobs(|j| j.add_job(job));
			// A child reaped during the readiness wait left its status in
			// the pending buffer; fold it in before anyone can observe the
			// job as running.
			let finished = match &added {
				Ok(_) => write_jobs(|j| j.settle_pending(child)),
				Err(_) => None,
			};

			signal::restore_sigmask(&prev)?;
			signal::rearm_job_signals()?;

			let jid = added?;
			if let Some(fatal) = finished {
				if fatal.is_some() {
					println!("Job [{}] ({}) terminated by signal 2", jid, child);
				}
			} else if background {
				print!("[{}] ({}) {}", jid, child, cmdline);
				let _ = io::stdout().flush();
			} else {
				signal::waitfg(child)?;
			}
			Ok(())
		}
		Err(_) => {
			let _ = signal::restore_sigmask(&prev);
			Err(ShError::ForkFailed)
		}
	}
}

/// Replace the child's image with the target program. On failure the child
/// reports and exits nonzero; the parent never sees this as an error.
pub fn exec_external(argv: &[String]) -> ! {
	let cargv = argv
		.iter()
		.map(|arg| CString::new(arg.as_str()).unwrap_or_default())
		.collect::<Vec<_>>();
	let envp = env::vars()
		.map(|(key, value)| CString::new(format!("{}={}", key, value)).unwrap_or_default())
		.collect::<Vec<_>>();

	let _ = execvpe(&cargv[0], &cargv, &envp);
	println!("{}", ShError::CommandNotFound(argv[0].clone()));
	std::process::exit(1);
}
