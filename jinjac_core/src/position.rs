use std::fmt::Display;

/// A location inside a template source. Lines and columns are 1-based,
/// `offset` is the 0-based byte offset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Position {
	pub line: usize,
	pub column: usize,
	pub offset: usize,
}

impl Default for Position {
	fn default() -> Self {
		Self::new(1, 1, 0)
	}
}

impl Position {
	pub const fn new(line: usize, column: usize, offset: usize) -> Self {
		Self {
			line,
			column,
			offset,
		}
	}

	/// Advance the position past every character of `text`.
	pub fn advance_str(&mut self, text: &str) {
		for ch in text.chars() {
			self.advance_char(ch);
		}
	}

	pub fn advance_char(&mut self, ch: char) {
		self.offset += ch.len_utf8();

		if ch == '\n' {
			self.line += 1;
			self.column = 1;
		} else {
			self.column += 1;
		}
	}

	/// Return a copy of this position moved forward by `text`.
	#[must_use]
	pub fn advanced(mut self, text: &str) -> Self {
		self.advance_str(text);
		self
	}
}

impl Display for Position {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		write!(f, "{}:{}", self.line, self.column)
	}
}
