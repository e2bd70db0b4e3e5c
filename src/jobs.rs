use log::debug;
use once_cell::sync::Lazy;
use std::sync::RwLock;

use crate::prelude::*;

/// Hard cap on simultaneously tracked jobs.
pub const MAX_JOBS: usize = 16;

/// Cap on statuses reaped before their job reached the table.
const MAX_PENDING: usize = 32;

/// The process-wide job table. Reached only through `read_jobs`/`write_jobs`.
///
/// The table is written from two contexts: the synchronous eval path and the
/// SIGCHLD/SIGINT/SIGTSTP handlers. The lock is not reentrant, so the eval
/// path must hold those three signals blocked across every call into these
/// helpers; the handlers themselves are installed with a mask that keeps them
/// from preempting one another.
static JOB_TABLE: Lazy<RwLock<JobTable>> = Lazy::new(|| RwLock::new(JobTable::new()));

pub fn read_jobs<F, T>(f: F) -> T
where F: FnOnce(&JobTable) -> T {
	let table = JOB_TABLE.read().unwrap();
	f(&table)
}

pub fn write_jobs<F, T>(f: F) -> T
where F: FnOnce(&mut JobTable) -> T {
	let mut table = JOB_TABLE.write().unwrap();
	f(&mut table)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobState {
	Foreground,
	Background,
	Stopped,
}

impl JobState {
	pub fn label(&self) -> &'static str {
		match self {
			JobState::Foreground => "Foreground",
			JobState::Background => "Running",
			JobState::Stopped => "Stopped",
		}
	}
}

/// One process belonging to a job. A single command has exactly one of
/// these; a pipeline has one per stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChildProc {
	pid: Pid,
	reaped: bool,
}

impl ChildProc {
	pub fn new(pid: Pid) -> Self {
		Self { pid, reaped: false }
	}

	pub fn pid(&self) -> Pid {
		self.pid
	}

	pub fn is_reaped(&self) -> bool {
		self.reaped
	}
}

/// One tracked job: a single command or a whole pipeline, keyed by its
/// process group id (the pid of its first process).
#[derive(Debug, Clone)]
pub struct Job {
	pgid: Pid,
	jid: usize,
	state: JobState,
	cmdline: String,
	children: Vec<ChildProc>,
	fatal_signal: Option<Signal>,
	stop_notified: bool,
	retired: bool,
}

impl Job {
	pub fn pgid(&self) -> Pid {
		self.pgid
	}

	pub fn jid(&self) -> usize {
		self.jid
	}

	pub fn state(&self) -> JobState {
		self.state
	}

	/// Leaving `Stopped` re-arms the stop notification so a later suspend
	/// of the same job is announced again.
	pub fn set_state(&mut self, state: JobState) {
		if state != JobState::Stopped {
			self.stop_notified = false;
		}
		self.state = state;
	}

	pub fn cmdline(&self) -> &str {
		&self.cmdline
	}

	pub fn children(&self) -> &[ChildProc] {
		&self.children
	}

	pub fn has_pid(&self, pid: Pid) -> bool {
		self.pgid == pid || self.children.iter().any(|child| child.pid == pid)
	}

	/// Record that `pid` has been waited on. A fatal signal is remembered so
	/// the job's termination can be reported once it fully retires.
	pub fn mark_reaped(&mut self, pid: Pid, fatal: Option<Signal>) {
		if let Some(child) = self.children.iter_mut().find(|child| child.pid == pid) {
			child.reaped = true;
		}
		if self.fatal_signal.is_none() {
			self.fatal_signal = fatal;
		}
	}

	/// True while any member process has not been reaped yet.
	pub fn is_alive(&self) -> bool {
		self.children.iter().any(|child| !child.reaped)
	}

	pub fn fatal_signal(&self) -> Option<Signal> {
		self.fatal_signal
	}

	pub fn stop_notified(&self) -> bool {
		self.stop_notified
	}

	pub fn set_stop_notified(&mut self) {
		self.stop_notified = true;
	}

	/// Mark the job dead without dropping it. Signal reactions must not
	/// free heap memory, so they retire a slot and the read loop sweeps
	/// it; a retired job is invisible to every lookup in the meantime.
	pub fn retire(&mut self) {
		self.retired = true;
	}

	pub fn is_retired(&self) -> bool {
		self.retired
	}

	pub fn killpg(&self, sig: Signal) -> Result<(), Errno> {
		killpg(self.pgid, sig)
	}

	/// One `jobs` listing line. The stored command line keeps its trailing
	/// newline, so callers print this with no separator of their own.
	pub fn display(&self) -> String {
		format!("[{}] ({}) {} {}", self.jid, self.pgid, self.state.label(), self.cmdline)
	}
}

#[derive(Debug, Default)]
pub struct JobBuilder {
	pgid: Option<Pid>,
	state: Option<JobState>,
	cmdline: String,
	children: Vec<ChildProc>,
}

impl JobBuilder {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn with_pgid(mut self, pgid: Pid) -> Self {
		self.pgid = Some(pgid);
		self
	}

	pub fn with_state(mut self, state: JobState) -> Self {
		self.state = Some(state);
		self
	}

	pub fn with_cmdline(mut self, cmdline: &str) -> Self {
		self.cmdline = cmdline.to_string();
		self
	}

	pub fn with_children(mut self, children: Vec<ChildProc>) -> Self {
		self.children = children;
		self
	}

	pub fn build(self) -> Job {
		let pgid = self.pgid.expect("job built without a pgid");
		let children = if self.children.is_empty() {
			vec![ChildProc::new(pgid)]
		} else {
			self.children
		};
		Job {
			pgid,
			jid: 0, // Assigned by the table on insertion
			state: self.state.expect("job built without a state"),
			cmdline: self.cmdline,
			children,
			fatal_signal: None,
			stop_notified: false,
			retired: false,
		}
	}
}

/// A terminal status waited on before its job was registered: the launcher
/// keeps SIGCHLD deliverable while it waits for process-group setup, so a
/// child killed in that window is reaped first and folded in afterwards.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct PendingReap {
	pid: Pid,
	fatal: Option<Signal>,
}

/// Fixed-capacity table of live jobs.
#[derive(Debug, Default)]
pub struct JobTable {
	jobs: [Option<Job>; MAX_JOBS],
	pending: [Option<PendingReap>; MAX_PENDING],
}

impl JobTable {
	pub fn new() -> Self {
		Self::default()
	}

	/// Live jobs only; retired slots are skipped until the sweep drops them.
	pub fn iter(&self) -> impl Iterator<Item = &Job> {
		self.jobs.iter().flatten().filter(|job| !job.retired)
	}

	fn iter_mut(&mut self) -> impl Iterator<Item = &mut Job> {
		self.jobs.iter_mut().flatten().filter(|job| !job.retired)
	}

	pub fn is_full(&self) -> bool {
		self.free_jid().is_none()
	}

	/// Smallest unused job id in `[1, MAX_JOBS]`, or None when the table
	/// is at capacity.
	fn free_jid(&self) -> Option<usize> {
		(1..=MAX_JOBS).find(|jid| !self.jobs.iter().flatten().any(|job| job.jid == *jid))
	}

	/// Insert a job, assigning it the smallest free jid. Rejects
	/// non-positive pgids and a full table without touching existing slots.
	pub fn add_job(&mut self, mut job: Job) -> ShResult<usize> {
		if job.pgid.as_raw() < 1 {
			return Err(ShError::Internal(format!("refusing to track pgid {}", job.pgid)));
		}
		let jid = self.free_jid().ok_or(ShError::JobTableFull)?;
		let slot = self.jobs.iter_mut().find(|slot| slot.is_none()).ok_or(ShError::JobTableFull)?;
		job.jid = jid;
		debug!("Added job [{}] {} {}", jid, job.pgid, job.cmdline.trim_end());
		*slot = Some(job);
		Ok(jid)
	}

	/// Clear the slot holding the job whose group is `pgid`.
	pub fn remove_job(&mut self, pgid: Pid) -> Option<Job> {
		if pgid.as_raw() < 1 {
			return None;
		}
		self.jobs
			.iter_mut()
			.find(|slot| slot.as_ref().is_some_and(|job| job.pgid == pgid))
			.and_then(|slot| slot.take())
	}

	/// Find the job that `pid` belongs to, whether it is the group leader
	/// or an inner pipeline stage.
	pub fn get_by_pid(&self, pid: Pid) -> Option<&Job> {
		if pid.as_raw() < 1 {
			return None;
		}
		self.iter().find(|job| job.has_pid(pid))
	}

	pub fn get_by_pid_mut(&mut self, pid: Pid) -> Option<&mut Job> {
		if pid.as_raw() < 1 {
			return None;
		}
		self.iter_mut().find(|job| job.has_pid(pid))
	}

	pub fn get_by_jid(&self, jid: usize) -> Option<&Job> {
		if jid < 1 {
			return None;
		}
		self.iter().find(|job| job.jid == jid)
	}

	pub fn get_by_jid_mut(&mut self, jid: usize) -> Option<&mut Job> {
		if jid < 1 {
			return None;
		}
		self.iter_mut().find(|job| job.jid == jid)
	}

	/// Group id of the unique foreground job, if one exists.
	pub fn fgpid(&self) -> Option<Pid> {
		self.iter().find(|job| job.state == JobState::Foreground).map(|job| job.pgid)
	}

	pub fn get_fg_mut(&mut self) -> Option<&mut Job> {
		self.iter_mut().find(|job| job.state == JobState::Foreground)
	}

	/// Remember a terminal status for a pid no job claims yet. Called from
	/// the SIGCHLD reaction; a fixed array write, nothing allocated.
	pub fn record_pending(&mut self, pid: Pid, fatal: Option<Signal>) {
		if let Some(slot) = self.pending.iter_mut().find(|slot| slot.is_none()) {
			*slot = Some(PendingReap { pid, fatal });
		}
	}

	/// Fold statuses reaped before registration into the job owning `pgid`.
	/// Returns `Some(fatal)` when the job fully retired as a result,
	/// `None` while any member is still running.
	pub fn settle_pending(&mut self, pgid: Pid) -> Option<Option<Signal>> {
		let job = self
			.jobs
			.iter_mut()
			.flatten()
			.find(|job| !job.retired && job.pgid == pgid)?;
		for slot in self.pending.iter_mut() {
			if let Some(pending) = slot {
				if job.has_pid(pending.pid) {
					job.mark_reaped(pending.pid, pending.fatal);
					*slot = None;
				}
			}
		}
		if job.is_alive() {
			None
		} else {
			let fatal = job.fatal_signal;
			job.retire();
			Some(fatal)
		}
	}

	/// Drop retired slots and stale pending statuses. Runs on the eval path
	/// with the job signals blocked; this is the only place a reaped job's
	/// heap storage is actually freed.
	pub fn sweep_retired(&mut self) {
		for slot in self.jobs.iter_mut() {
			if slot.as_ref().is_some_and(|job| job.retired) {
				slot.take();
			}
		}
		// Anything still pending belongs to a launch that never registered.
		self.pending = Default::default();
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	fn job(pid: i32, state: JobState, cmdline: &str) -> Job {
		JobBuilder::new()
			.with_pgid(Pid::from_raw(pid))
			.with_state(state)
			.with_cmdline(cmdline)
			.build()
	}

	#[test]
	fn add_then_lookup_roundtrip() {
		let mut table = JobTable::new();
		let jid = table.add_job(job(100, JobState::Background, "sleep 5 &\n")).unwrap();
		assert_eq!(jid, 1);

		let found = table.get_by_pid(Pid::from_raw(100)).unwrap();
		assert_eq!(found.pgid(), Pid::from_raw(100));
		assert_eq!(found.jid(), 1);
		assert_eq!(found.state(), JobState::Background);
		assert_eq!(found.cmdline(), "sleep 5 &\n");

		assert!(table.remove_job(Pid::from_raw(100)).is_some());
		assert!(table.get_by_pid(Pid::from_raw(100)).is_none());
		assert!(table.get_by_jid(1).is_none());
	}

	#[test]
	fn smallest_free_jid_is_reused() {
		let mut table = JobTable::new();
		for pid in 1..=4 {
			table.add_job(job(pid * 100, JobState::Background, "cmd\n")).unwrap();
		}
		table.remove_job(Pid::from_raw(200)).unwrap();
		let jid = table.add_job(job(900, JobState::Background, "cmd\n")).unwrap();
		assert_eq!(jid, 2);
	}

	#[test]
	fn jids_are_distinct_and_in_range() {
		let mut table = JobTable::new();
		for pid in 1..=MAX_JOBS as i32 {
			table.add_job(job(pid, JobState::Background, "cmd\n")).unwrap();
		}
		let mut jids: Vec<usize> = table.iter().map(|job| job.jid()).collect();
		jids.sort_unstable();
		assert_eq!(jids, (1..=MAX_JOBS).collect::<Vec<_>>());
	}

	#[test]
	fn capacity_rejection_leaves_table_unmodified() {
		let mut table = JobTable::new();
		for pid in 1..=MAX_JOBS as i32 {
			table.add_job(job(pid, JobState::Background, "cmd\n")).unwrap();
		}
		assert!(table.is_full());
		let err = table.add_job(job(999, JobState::Background, "cmd\n")).unwrap_err();
		assert_eq!(err, ShError::JobTableFull);
		assert_eq!(table.iter().count(), MAX_JOBS);
		assert!(table.get_by_pid(Pid::from_raw(999)).is_none());
	}

	#[test]
	fn rejects_nonpositive_identifiers() {
		let mut table = JobTable::new();
		assert!(table.add_job(job(0, JobState::Background, "cmd\n")).is_err());
		assert!(table.get_by_pid(Pid::from_raw(0)).is_none());
		assert!(table.get_by_pid(Pid::from_raw(-5)).is_none());
		assert!(table.get_by_jid(0).is_none());
		assert!(table.remove_job(Pid::from_raw(0)).is_none());
	}

	#[test]
	fn at_most_one_foreground_job() {
		let mut table = JobTable::new();
		table.add_job(job(100, JobState::Foreground, "a\n")).unwrap();
		table.add_job(job(200, JobState::Background, "b\n")).unwrap();
		table.add_job(job(300, JobState::Stopped, "c\n")).unwrap();
		assert_eq!(table.fgpid(), Some(Pid::from_raw(100)));
		assert_eq!(
			table.iter().filter(|job| job.state() == JobState::Foreground).count(),
			1
		);

		table.get_fg_mut().unwrap().set_state(JobState::Stopped);
		assert_eq!(table.fgpid(), None);
	}

	#[test]
	fn pipeline_job_retires_only_when_all_members_reaped() {
		let mut table = JobTable::new();
		let pids = [100, 101, 102].map(Pid::from_raw);
		let pipeline = JobBuilder::new()
			.with_pgid(pids[0])
			.with_state(JobState::Foreground)
			.with_cmdline("a | b | c\n")
			.with_children(pids.iter().map(|pid| ChildProc::new(*pid)).collect())
			.build();
		table.add_job(pipeline).unwrap();

		// Inner stages are found by their own pids, not just the leader's.
		for pid in pids {
			assert!(table.get_by_pid(pid).is_some());
		}

		let job = table.get_by_pid_mut(pids[1]).unwrap();
		job.mark_reaped(pids[1], None);
		assert!(job.is_alive());
		job.mark_reaped(pids[2], Some(Signal::SIGINT));
		assert!(job.is_alive());
		job.mark_reaped(pids[0], None);
		assert!(!job.is_alive());
		// The fatal signal sticks around for the retirement notification.
		assert_eq!(job.fatal_signal(), Some(Signal::SIGINT));
	}

	#[test]
	fn stop_notification_rearms_on_continue() {
		let mut table = JobTable::new();
		table.add_job(job(100, JobState::Foreground, "sleep 5\n")).unwrap();
		let job = table.get_by_jid_mut(1).unwrap();

		job.set_state(JobState::Stopped);
		assert!(!job.stop_notified());
		job.set_stop_notified();
		assert!(job.stop_notified());

		job.set_state(JobState::Background);
		assert!(!job.stop_notified());
	}

	#[test]
	fn retired_jobs_are_invisible_until_swept() {
		let mut table = JobTable::new();
		let pid = Pid::from_raw(100);
		table.add_job(job(100, JobState::Foreground, "sleep 5\n")).unwrap();

		let fg = table.get_by_pid_mut(pid).unwrap();
		fg.mark_reaped(pid, None);
		fg.retire();

		// Retired but unswept: every lookup misses, so the foreground
		// waiter wakes and a new launch cannot resolve the dead job.
		assert_eq!(table.fgpid(), None);
		assert!(table.get_by_pid(pid).is_none());
		assert!(table.get_by_jid(1).is_none());
		assert_eq!(table.iter().count(), 0);

		// The slot and its jid stay claimed until the sweep frees them.
		let jid = table.add_job(job(200, JobState::Background, "a\n")).unwrap();
		assert_eq!(jid, 2);
		table.sweep_retired();
		let jid = table.add_job(job(300, JobState::Background, "b\n")).unwrap();
		assert_eq!(jid, 1);
	}

	#[test]
	fn early_reaps_settle_into_a_fresh_job() {
		let mut table = JobTable::new();
		let pid = Pid::from_raw(300);

		// The status landed before the job existed.
		table.record_pending(pid, Some(Signal::SIGINT));
		table.add_job(job(300, JobState::Foreground, "sleep 5\n")).unwrap();

		assert_eq!(table.settle_pending(pid), Some(Some(Signal::SIGINT)));
		assert_eq!(table.fgpid(), None);
		assert!(table.get_by_jid(1).is_none());
	}

	#[test]
	fn settle_leaves_a_partially_reaped_pipeline_running() {
		let mut table = JobTable::new();
		let pids = [400, 401].map(Pid::from_raw);
		let pipeline = JobBuilder::new()
			.with_pgid(pids[0])
			.with_state(JobState::Foreground)
			.with_cmdline("a | b\n")
			.with_children(pids.iter().map(|pid| ChildProc::new(*pid)).collect())
			.build();

		table.record_pending(pids[1], None);
		table.add_job(pipeline).unwrap();

		assert_eq!(table.settle_pending(pids[0]), None);
		let job = table.get_by_pid(pids[0]).unwrap();
		assert!(job.is_alive());
		assert_eq!(table.fgpid(), Some(pids[0]));
	}

	#[test]
	fn sweep_clears_stale_pending_statuses() {
		let mut table = JobTable::new();
		let pid = Pid::from_raw(500);
		table.record_pending(pid, None);
		table.sweep_retired();

		// A later job reusing the pid must not inherit the stale status.
		table.add_job(job(500, JobState::Background, "c\n")).unwrap();
		assert_eq!(table.settle_pending(pid), None);
		assert!(table.get_by_pid(pid).unwrap().is_alive());
	}

	#[test]
	fn display_formats_listing_line() {
		let mut table = JobTable::new();
		table.add_job(job(4242, JobState::Stopped, "sleep 100\n")).unwrap();
		let line = table.get_by_jid(1).unwrap().display();
		assert_eq!(line, "[1] (4242) Stopped sleep 100\n");
	}
}
