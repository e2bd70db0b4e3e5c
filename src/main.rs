pub mod builtin;
pub mod error;
pub mod execute;
pub mod jobs;
pub mod prelude;
pub mod signal;
pub mod token;

use clap::{Arg, ArgAction, Command};
use log::{debug, error};

use crate::prelude::*;

pub const PROMPT: &str = "tash> ";

struct ShOpts {
	verbose: bool,
	emit_prompt: bool,
}

fn main() {
	// A driver reading our stdout pipe should see diagnostics too.
	let _ = dup2(STDOUT_FILENO, STDERR_FILENO);

	let opts = parse_flags();

	let mut logger = env_logger::Builder::from_env(env_logger::Env::default());
	if opts.verbose {
		logger.filter_level(log::LevelFilter::Debug);
	}
	logger.init();

	if let Err(e) = signal::sig_handler_setup() {
		error!("{}", e);
		println!("{}", e);
		std::process::exit(1);
	}

	debug!("Starting read loop");
	read_loop(&opts);
}

fn read_loop(opts: &ShOpts) -> ! {
	let stdin = io::stdin();
	loop {
		sweep_jobs();

		if opts.emit_prompt {
			print!("{}", PROMPT);
			let _ = io::stdout().flush();
		}

		let mut line = String::new();
		match stdin.read_line(&mut line) {
			// End of input terminates the shell cleanly.
			Ok(0) => {
				let _ = io::stdout().flush();
				std::process::exit(0);
			}
			Ok(_) => {
				if let Err(e) = execute::eval(&line) {
					if e.is_fatal() {
						error!("{}", e);
						std::process::exit(1);
					}
					println!("{}", e);
				}
				let _ = io::stdout().flush();
			}
			Err(e) => {
				println!("read error: {}", e);
				std::process::exit(1);
			}
		}
	}
}

/// Free the slots of jobs the signal reactions retired. Reactions never
/// drop a Job themselves (the interrupted code may hold the allocator), so
/// this is where that storage is actually released, with the reactions
/// masked off.
fn sweep_jobs() {
	if let Ok(prev) = signal::block_sigmask(&signal::job_sigmask()) {
		write_jobs(|j| j.sweep_retired());
		let _ = signal::restore_sigmask(&prev);
	}
}

fn parse_flags() -> ShOpts {
	let cmd = Command::new("tash")
		.disable_help_flag(true)
		.arg(Arg::new("help").short('h').action(ArgAction::SetTrue))
		.arg(Arg::new("verbose").short('v').action(ArgAction::SetTrue))
		.arg(Arg::new("no-prompt").short('p').action(ArgAction::SetTrue));

	let matches = match cmd.try_get_matches() {
		Ok(matches) => matches,
		Err(_) => usage(),
	};
	if matches.get_flag("help") {
		usage();
	}
	ShOpts {
		verbose: matches.get_flag("verbose"),
		emit_prompt: !matches.get_flag("no-prompt"),
	}
}

fn usage() -> ! {
	println!("Usage: tash [-hvp]");
	println!("   -h   print this message");
	println!("   -v   print additional diagnostic information");
	println!("   -p   do not emit a command prompt");
	std::process::exit(1);
}
