use crate::{prelude::*, signal};

/// Print one line per live job. The traversal runs with the job signals
/// blocked so a reaping cannot mutate the table mid-listing.
pub fn list_jobs() -> ShResult<()> {
	let prev = signal::block_sigmask(&signal::job_sigmask())?;
	let listing = read_jobs(|j| j.iter().map(|job| job.display()).collect::<Vec<_>>());
	signal::restore_sigmask(&prev)?;

	let mut stdout = io::stdout();
	for line in listing {
		// Each line already carries the command's trailing newline.
		write!(stdout, "{}", line)?;
	}
	let _ = stdout.flush();
	Ok(())
}
