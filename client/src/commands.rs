//! Parses one stdin line into a verb + argument, per §4.4: "the first
//! whitespace-separated token determines the verb (case-insensitive); its
//! argument is the rest of the line after the first space."

#[derive(Debug, PartialEq, Eq)]
pub enum Command {
	Discover,
	Search { substr: String },
	Fetch { name: String },
	Upload { path: String },
	Remove { name: String },
	Exit,
	/// Anything else is "ignored silently" per §4.4.
	Unknown,
}

pub fn parse(line: &str) -> Command {
	let line = line.trim_end_matches(['\r', '\n']);
	let (verb, rest) = match line.split_once(char::is_whitespace) {
		Some((v, r)) => (v, r.trim_start()),
		None => (line, ""),
	};

	match verb.to_ascii_lowercase().as_str() {
		"discover" => Command::Discover,
		"search" => Command::Search { substr: rest.to_owned() },
		"fetch" if !rest.is_empty() => Command::Fetch { name: rest.to_owned() },
		"upload" if !rest.is_empty() => Command::Upload { path: rest.to_owned() },
		"remove" if !rest.is_empty() => Command::Remove { name: rest.to_owned() },
		"exit" => Command::Exit,
		_ => Command::Unknown,
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn parses_verbs_case_insensitively() {
		assert_eq!(parse("DISCOVER"), Command::Discover);
		assert_eq!(parse("Search foo"), Command::Search { substr: "foo".into() });
	}

	#[test]
	fn search_accepts_empty_substring() {
		assert_eq!(parse("search"), Command::Search { substr: String::new() });
		assert_eq!(parse("search "), Command::Search { substr: String::new() });
	}

	#[test]
	fn fetch_upload_remove_require_an_argument() {
		assert_eq!(parse("fetch"), Command::Unknown);
		assert_eq!(parse("fetch a.txt"), Command::Fetch { name: "a.txt".into() });
		assert_eq!(parse("upload"), Command::Unknown);
		assert_eq!(parse("remove"), Command::Unknown);
	}

	#[test]
	fn unrecognised_verb_is_ignored() {
		assert_eq!(parse("frobnicate"), Command::Unknown);
		assert_eq!(parse(""), Command::Unknown);
	}
}
