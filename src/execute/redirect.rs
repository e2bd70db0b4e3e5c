use crate::prelude::*;

/// Redirection targets pulled out of an argument sequence. At most one
/// input and one output per command; a repeated operator keeps the last
/// path named.
#[derive(Debug, Default, PartialEq)]
pub struct Redirs {
	pub stdin_path: Option<String>,
	pub stdout_path: Option<String>,
}

impl Redirs {
	pub fn is_empty(&self) -> bool {
		self.stdin_path.is_none() && self.stdout_path.is_none()
	}
}

/// Scan `argv` for `<` and `>`, returning the argument sequence with both
/// the operator and its path removed, plus the extracted targets.
pub fn scan(argv: &[String]) -> ShResult<(Vec<String>, Redirs)> {
	let mut clean = vec![];
	let mut redirs = Redirs::default();
	let mut iter = argv.iter();

	while let Some(arg) = iter.next() {
		match arg.as_str() {
			"<" => {
				let path = iter
					.next()
					.ok_or_else(|| ShError::InvalidSyntax("expected a path after `<`".into()))?;
				redirs.stdin_path = Some(path.clone());
			}
			">" => {
				let path = iter
					.next()
					.ok_or_else(|| ShError::InvalidSyntax("expected a path after `>`".into()))?;
				redirs.stdout_path = Some(path.clone());
			}
			_ => clean.push(arg.clone()),
		}
	}
	Ok((clean, redirs))
}

/// Wire the extracted targets onto stdin/stdout. Called in the child only,
/// before the exec; an open failure here is fatal to the child alone.
pub fn apply(redirs: &Redirs) -> ShResult<()> {
	if let Some(path) = &redirs.stdin_path {
		let fd = open(path.as_str(), OFlag::O_RDONLY, Mode::empty())
			.map_err(|e| ShError::Errno("Input redirection error", e))?;
		dup2(fd, STDIN_FILENO).map_err(|e| ShError::Errno("Input redirection error", e))?;
		close(fd).map_err(|e| ShError::Errno("Input redirection error", e))?;
	}
	if let Some(path) = &redirs.stdout_path {
		let fd = open(
			path.as_str(),
			OFlag::O_WRONLY | OFlag::O_CREAT | OFlag::O_TRUNC,
			Mode::from_bits_truncate(0o644),
		)
		.map_err(|e| ShError::Errno("Output redirection error", e))?;
		dup2(fd, STDOUT_FILENO).map_err(|e| ShError::Errno("Output redirection error", e))?;
		close(fd).map_err(|e| ShError::Errno("Output redirection error", e))?;
	}
	Ok(())
}

#[cfg(test)]
mod tests {
	use super::*;

	fn argv(args: &[&str]) -> Vec<String> {
		args.iter().map(|a| a.to_string()).collect()
	}

	#[test]
	fn no_redirections_passes_argv_through() {
		let (clean, redirs) = scan(&argv(&["ls", "-l"])).unwrap();
		assert_eq!(clean, argv(&["ls", "-l"]));
		assert!(redirs.is_empty());
	}

	#[test]
	fn extracts_input_and_output() {
		let (clean, redirs) = scan(&argv(&["sort", "<", "in.txt", ">", "out.txt", "-r"])).unwrap();
		assert_eq!(clean, argv(&["sort", "-r"]));
		assert_eq!(redirs.stdin_path.as_deref(), Some("in.txt"));
		assert_eq!(redirs.stdout_path.as_deref(), Some("out.txt"));
	}

	#[test]
	fn repeated_operator_keeps_last_path() {
		let (clean, redirs) = scan(&argv(&["cat", ">", "a", ">", "b"])).unwrap();
		assert_eq!(clean, argv(&["cat"]));
		assert_eq!(redirs.stdout_path.as_deref(), Some("b"));
	}

	#[test]
	fn dangling_operator_is_a_syntax_error() {
		assert!(scan(&argv(&["cat", "<"])).is_err());
		assert!(scan(&argv(&["cat", ">"])).is_err());
	}
}
