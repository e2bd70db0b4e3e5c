use nix::sys::signal::{sigaction, SaFlags, SigAction, SigHandler};

use crate::prelude::*;

/// Set by the SIGUSR1 handler once a freshly forked child has moved itself
/// into its own process group. Read by the launcher before it registers
/// the new job.
pub static CHILD_READY: AtomicBool = AtomicBool::new(false);

/// The three signals that race with job table mutation. The eval path blocks
/// them around every span that is not a single table operation, most
/// importantly the span between fork and job registration.
pub fn job_sigmask() -> SigSet {
	let mut mask = SigSet::empty();
	mask.add(Signal::SIGCHLD);
	mask.add(Signal::SIGINT);
	mask.add(Signal::SIGTSTP);
	mask
}

/// Mask held across process creation: the job signals plus SIGUSR1, so the
/// child's readiness notification can only land inside `wait_child_ready`.
pub fn launch_sigmask() -> SigSet {
	let mut mask = job_sigmask();
	mask.add(Signal::SIGUSR1);
	mask
}

/// Block `mask` and hand back the previous mask for `restore_sigmask`.
pub fn block_sigmask(mask: &SigSet) -> ShResult<SigSet> {
	let mut prev = SigSet::empty();
	sigprocmask(SigmaskHow::SIG_BLOCK, Some(mask), Some(&mut prev))
		.map_err(|e| ShError::Errno("sigprocmask", e))?;
	Ok(prev)
}

pub fn restore_sigmask(prev: &SigSet) -> ShResult<()> {
	sigprocmask(SigmaskHow::SIG_SETMASK, Some(prev), None)
		.map_err(|e| ShError::Errno("sigprocmask", e))?;
	Ok(())
}

fn install(sig: Signal, handler: extern "C" fn(libc::c_int)) -> ShResult<()> {
	// Handlers share a mask so none of them can preempt another mid-update.
	let action = SigAction::new(SigHandler::Handler(handler), SaFlags::SA_RESTART, job_sigmask());
	unsafe { sigaction(sig, &action) }.map_err(ShError::SetupFailed)?;
	Ok(())
}

pub fn sig_handler_setup() -> ShResult<()> {
	install(Signal::SIGCHLD, handle_sigchld)?;
	install(Signal::SIGINT, handle_sigint)?;
	install(Signal::SIGTSTP, handle_sigtstp)?;
	install(Signal::SIGQUIT, handle_sigquit)?;
	install(Signal::SIGUSR1, handle_sigusr1)?;
	Ok(())
}

/// Re-install the interrupt/stop reactions after a launch, mirroring the
/// launcher contract.
pub fn rearm_job_signals() -> ShResult<()> {
	install(Signal::SIGINT, handle_sigint)?;
	install(Signal::SIGTSTP, handle_sigtstp)?;
	Ok(())
}

/// Block until `pid` is no longer the foreground job. SIGCHLD stays blocked
/// across the check so a status change cannot slip between the check and the
/// suspend; `sigsuspend` swaps the old mask back in atomically while waiting.
pub fn waitfg(pid: Pid) -> ShResult<()> {
	let prev = block_sigmask(&job_sigmask())?;
	while read_jobs(|j| j.fgpid()) == Some(pid) {
		let _ = prev.suspend(); // Always "fails" with EINTR once a signal lands
	}
	restore_sigmask(&prev)
}

/// Suspend until `child` reports that its process group is set up. SIGUSR1
/// must be blocked on entry (see `launch_sigmask`) so the flag check and the
/// suspend are atomic with respect to its delivery.
///
/// SIGCHLD is also let through while suspended: a child killed before it can
/// raise SIGUSR1 never will, so its death has to end the wait. The reaper
/// finds no registered job for it yet and parks the status in the pending
/// buffer; the launcher folds it in right after registration.
pub fn wait_child_ready(child: Pid) {
	let mut suspend_mask = SigSet::thread_get_mask().unwrap_or_else(|_| SigSet::empty());
	suspend_mask.remove(Signal::SIGUSR1);
	suspend_mask.remove(Signal::SIGCHLD);
	while !CHILD_READY.load(Ordering::SeqCst) {
		// Reaped already: the pid is gone and SIGUSR1 will never arrive.
		if kill(child, None).is_err() {
			break;
		}
		let _ = suspend_mask.suspend();
	}
	CHILD_READY.store(false, Ordering::SeqCst);
}

/// Reap every child whose status changed. Several SIGCHLDs may coalesce
/// into one delivery, so this loops until the kernel has nothing left, but
/// WNOHANG keeps it from waiting on still-running children.
extern "C" fn handle_sigchld(_: libc::c_int) {
	let flags = WaitPidFlag::WNOHANG | WaitPidFlag::WUNTRACED;
	while let Ok(status) = waitpid(None, Some(flags)) {
		match status {
			WaitStatus::Exited(pid, _code) => reap_child(pid, None),
			WaitStatus::Signaled(pid, sig, _) => reap_child(pid, Some(sig)),
			WaitStatus::Stopped(pid, _sig) => stop_child(pid),
			WaitStatus::StillAlive => break,
			_ => continue,
		}
	}
}

/// Account for one waited-on member. The logical job retires only once
/// every member has been reaped; a fatal signal seen on any member is
/// reported at retirement, normal exits retire silently. A pid no job
/// claims yet died mid-launch; its status is parked for the launcher.
///
/// This runs inside a handler, so the slot is retired rather than removed:
/// dropping the Job would free its heap storage here, and the interrupted
/// code may itself be inside the allocator. The read loop sweeps retired
/// slots with these signals blocked.
fn reap_child(pid: Pid, fatal: Option<Signal>) {
	write_jobs(|j| {
		match j.get_by_pid_mut(pid) {
			Some(job) => {
				job.mark_reaped(pid, fatal);
				if !job.is_alive() {
					if job.fatal_signal().is_some() {
						println!("Job [{}] ({}) terminated by signal 2", job.jid(), job.pgid());
					}
					job.retire();
				}
			}
			None => j.record_pending(pid, fatal),
		}
	});
}

/// A member stopped: announce once per suspension and mark the whole job
/// stopped. The SIGTSTP reaction may have set the state eagerly already;
/// the notification flag keeps a pipeline's stages from repeating the line.
fn stop_child(pid: Pid) {
	write_jobs(|j| {
		if let Some(job) = j.get_by_pid_mut(pid) {
			if !job.stop_notified() {
				println!("Job [{}] ({}) stopped by signal 20", job.jid(), job.pgid());
				job.set_stop_notified();
			}
			job.set_state(JobState::Stopped);
		}
	});
}

/// Keyboard interrupt: forward to the foreground process group, never to
/// the shell's own group.
extern "C" fn handle_sigint(_: libc::c_int) {
	if let Some(pgid) = read_jobs(|j| j.fgpid()) {
		let _ = killpg(pgid, Signal::SIGINT);
	}
}

/// Keyboard suspend: mark the job stopped *before* forwarding, so the
/// foreground waiter can never observe the old state after the group stops.
extern "C" fn handle_sigtstp(_: libc::c_int) {
	write_jobs(|j| {
		if let Some(job) = j.get_fg_mut() {
			job.set_state(JobState::Stopped);
			let _ = job.killpg(Signal::SIGTSTP);
		}
	});
}

extern "C" fn handle_sigquit(_: libc::c_int) {
	println!("Terminating after receipt of SIGQUIT signal");
	std::process::exit(1);
}

extern "C" fn handle_sigusr1(_: libc::c_int) {
	CHILD_READY.store(true, Ordering::SeqCst);
}
