pub mod command;
pub mod pipeline;
pub mod redirect;

use crate::{builtin, error::ShResult, token};

/// Evaluate one input line: tokenize, then hand off to the builtin
/// dispatcher or the matching launcher. Pipelines are recognized before
/// builtins so a `|` anywhere in the line always means a pipeline.
pub fn eval(line: &str) -> ShResult<()> {
	let tokens = token::tokenize(line);
	if tokens.is_empty() {
		return Ok(());
	}
	if tokens.iter().any(|tk| tk == "|") {
		return pipeline::exec_pipeline(&tokens, line);
	}
	if builtin::dispatch(&tokens)? {
		return Ok(());
	}
	command::exec_cmd(&tokens, line)
}
