pub mod bgfg;
pub mod jobs;

use crate::error::ShResult;

pub const BUILTINS: [&str; 4] = ["quit", "jobs", "bg", "fg"];

/// Intercept builtins on the first token, before any process is created.
/// Returns false when the line is not a builtin and should be launched.
pub fn dispatch(tokens: &[String]) -> ShResult<bool> {
	match tokens[0].as_str() {
		"quit" => std::process::exit(0),
		"jobs" => {
			jobs::list_jobs()?;
			Ok(true)
		}
		"bg" => {
			bgfg::continue_job(tokens, false)?;
			Ok(true)
		}
		"fg" => {
			bgfg::continue_job(tokens, true)?;
			Ok(true)
		}
		_ => Ok(false),
	}
}
