pub const WHITESPACE: [char; 3] = [' ', '\t', '\n'];
pub const OPERATORS: [char; 4] = ['&', '|', '<', '>'];

/// Split a raw input line into an ordered argument-token sequence.
///
/// A span enclosed in single quotes becomes one token with the quotes
/// stripped. Unquoted `&`, `|`, `<` and `>` come back as standalone tokens.
/// The trailing line terminator is just a separator.
pub fn tokenize(line: &str) -> Vec<String> {
	let mut tokens = vec![];
	let mut chars = line.chars().peekable();

	while let Some(&ch) = chars.peek() {
		if WHITESPACE.contains(&ch) {
			chars.next();
		} else if OPERATORS.contains(&ch) {
			chars.next();
			tokens.push(ch.to_string());
		} else if ch == '\'' {
			chars.next();
			let mut word = String::new();
			for ch in chars.by_ref() {
				if ch == '\'' {
					break;
				}
				word.push(ch);
			}
			tokens.push(word);
		} else {
			let mut word = String::new();
			while let Some(&ch) = chars.peek() {
				if WHITESPACE.contains(&ch) || OPERATORS.contains(&ch) || ch == '\'' {
					break;
				}
				word.push(ch);
				chars.next();
			}
			tokens.push(word);
		}
	}
	tokens
}

/// The final token, if exactly `&`, marks the job as background.
pub fn is_background(tokens: &[String]) -> bool {
	tokens.last().is_some_and(|tk| tk == "&")
}

#[cfg(test)]
mod tests {
	use super::*;

	fn tk(line: &str) -> Vec<String> {
		tokenize(line)
	}

	#[test]
	fn splits_on_whitespace() {
		assert_eq!(tk("ls -l /home/user\n"), ["ls", "-l", "/home/user"]);
	}

	#[test]
	fn empty_and_blank_lines_yield_nothing() {
		assert!(tk("").is_empty());
		assert!(tk("\n").is_empty());
		assert!(tk("   \t \n").is_empty());
	}

	#[test]
	fn single_quoted_span_is_one_token() {
		assert_eq!(tk("echo 'Hello, world!'\n"), ["echo", "Hello, world!"]);
	}

	#[test]
	fn operators_are_standalone_tokens() {
		assert_eq!(tk("cat<in.txt >out.txt\n"), ["cat", "<", "in.txt", ">", "out.txt"]);
		assert_eq!(tk("a|b | c\n"), ["a", "|", "b", "|", "c"]);
	}

	#[test]
	fn quoted_operators_stay_literal() {
		assert_eq!(tk("echo '|' '&'\n"), ["echo", "|", "&"]);
		assert_eq!(tk("echo 'a & b'\n"), ["echo", "a & b"]);
	}

	#[test]
	fn trailing_ampersand_marks_background() {
		let tokens = tk("sleep 5 &\n");
		assert_eq!(tokens, ["sleep", "5", "&"]);
		assert!(is_background(&tokens));

		let tokens = tk("sleep 5&\n");
		assert_eq!(tokens, ["sleep", "5", "&"]);
		assert!(is_background(&tokens));

		assert!(!is_background(&tk("sleep 5\n")));
	}
}
