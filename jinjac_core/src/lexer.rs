use std::collections::VecDeque;

use logos::Logos;

use crate::Position;
use crate::tokens::Token;
use crate::tokens::TokenKind;

/// Raw tokens produced by logos for the inside of `{{ }}` and `{% %}` tags.
#[derive(Logos, Debug, Clone, Copy, PartialEq)]
#[logos(skip r"[ \t\r\n\f]+")]
enum RawToken {
	#[token("}}")]
	VariableEnd,
	#[token("-}}")]
	VariableEndTrim,
	#[token("%}")]
	StatementEnd,
	#[token("-%}")]
	StatementEndTrim,
	#[regex(r"[a-zA-Z_][a-zA-Z0-9_]*")]
	Name,
	#[regex(r#""([^"\\]|\\.)*""#)]
	DoubleQuotedString,
	#[regex(r"'([^'\\]|\\.)*'")]
	SingleQuotedString,
	#[regex(r"[0-9]+")]
	Integer,
	#[regex(r"[0-9]+\.[0-9]+")]
	Float,
	#[token("**")]
	Pow,
	#[token("//")]
	FloorDiv,
	#[token("==")]
	Eq,
	#[token("!=")]
	Ne,
	#[token("<=")]
	Le,
	#[token(">=")]
	Ge,
	#[token("|")]
	Pipe,
	#[token(".")]
	Dot,
	#[token(",")]
	Comma,
	#[token(":")]
	Colon,
	#[token("=")]
	Assign,
	#[token("<")]
	Lt,
	#[token(">")]
	Gt,
	#[token("+")]
	Add,
	#[token("-")]
	Sub,
	#[token("*")]
	Mul,
	#[token("/")]
	Div,
	#[token("%")]
	Mod,
	#[token("~")]
	Tilde,
	#[token("(")]
	LeftParen,
	#[token(")")]
	RightParen,
	#[token("[")]
	LeftBracket,
	#[token("]")]
	RightBracket,
	#[token("{")]
	LeftBrace,
	#[token("}")]
	RightBrace,
}

impl RawToken {
	fn kind(self) -> TokenKind {
		match self {
			RawToken::VariableEnd | RawToken::VariableEndTrim => TokenKind::VariableEnd,
			RawToken::StatementEnd | RawToken::StatementEndTrim => TokenKind::StatementEnd,
			RawToken::Name => TokenKind::Name,
			RawToken::DoubleQuotedString | RawToken::SingleQuotedString => TokenKind::String,
			RawToken::Integer => TokenKind::Integer,
			RawToken::Float => TokenKind::Float,
			RawToken::Pow => TokenKind::Pow,
			RawToken::FloorDiv => TokenKind::FloorDiv,
			RawToken::Eq => TokenKind::Eq,
			RawToken::Ne => TokenKind::Ne,
			RawToken::Le => TokenKind::Le,
			RawToken::Ge => TokenKind::Ge,
			RawToken::Pipe => TokenKind::Pipe,
			RawToken::Dot => TokenKind::Dot,
			RawToken::Comma => TokenKind::Comma,
			RawToken::Colon => TokenKind::Colon,
			RawToken::Assign => TokenKind::Assign,
			RawToken::Lt => TokenKind::Lt,
			RawToken::Gt => TokenKind::Gt,
			RawToken::Add => TokenKind::Add,
			RawToken::Sub => TokenKind::Sub,
			RawToken::Mul => TokenKind::Mul,
			RawToken::Div => TokenKind::Div,
			RawToken::Mod => TokenKind::Mod,
			RawToken::Tilde => TokenKind::Tilde,
			RawToken::LeftParen => TokenKind::LeftParen,
			RawToken::RightParen => TokenKind::RightParen,
			RawToken::LeftBracket => TokenKind::LeftBracket,
			RawToken::RightBracket => TokenKind::RightBracket,
			RawToken::LeftBrace => TokenKind::LeftBrace,
			RawToken::RightBrace => TokenKind::RightBrace,
		}
	}
}

/// The lexical states of the template scanner.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LexerState {
	/// Literal text outside of any tag.
	Data,
	/// Inside `{{ ... }}`.
	Expression,
	/// Inside `{% ... %}`.
	Statement,
	/// Inside `{# ... #}`.
	Comment,
	/// Inside `{% raw %}...{% endraw %}`.
	Raw,
}

/// Tracks whether the current statement is exactly `{% raw %}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RawCandidate {
	None,
	Opened,
	Named,
}

/// Whitespace options applied while scanning text between tags.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LexerOptions {
	/// Remove the first newline after a statement or comment tag.
	pub trim_blocks: bool,
	/// Strip spaces and tabs from the start of a line up to a statement or
	/// comment tag.
	pub lstrip_blocks: bool,
}

/// Lazily scans a template into tokens. The stream always ends with a single
/// [`TokenKind::Eof`] token.
pub struct Lexer<'a> {
	source: &'a str,
	cursor: usize,
	position: Position,
	state: LexerState,
	options: LexerOptions,
	pending: VecDeque<Token>,
	/// A `-` on the last closing delimiter strips leading whitespace from the
	/// following text.
	trim_next: bool,
	/// The last tag closed was a statement or comment.
	after_block: bool,
	raw: RawCandidate,
	finished: bool,
}

/// Tokenize `source` with the default whitespace options.
pub fn tokenize(source: &str) -> Lexer<'_> {
	Lexer::new(source, LexerOptions::default())
}

/// Tokenize `source` with explicit whitespace options.
pub fn tokenize_with(source: &str, options: LexerOptions) -> Lexer<'_> {
	Lexer::new(source, options)
}

/// Tokenize a bare expression such as `user.name|upper`, without the
/// surrounding `{{ }}`.
pub fn tokenize_expression(source: &str) -> Lexer<'_> {
	let mut lexer = Lexer::new(source, LexerOptions::default());
	lexer.state = LexerState::Expression;
	lexer
}

impl<'a> Lexer<'a> {
	pub fn new(source: &'a str, options: LexerOptions) -> Self {
		Self {
			source,
			cursor: 0,
			position: Position::default(),
			state: LexerState::Data,
			options,
			pending: VecDeque::new(),
			trim_next: false,
			after_block: false,
			raw: RawCandidate::None,
			finished: false,
		}
	}

	/// The state the scanner is currently in.
	pub fn state(&self) -> LexerState {
		self.state
	}

	fn advance_to(&mut self, cursor: usize) {
		let slice = &self.source[self.cursor..cursor];
		self.position.advance_str(slice);
		self.cursor = cursor;
	}

	fn push(&mut self, kind: TokenKind, start: usize, end: usize, text: impl Into<String>) {
		let position = self.position.advanced(&self.source[self.cursor..start]);
		self.pending
			.push_back(Token::new(kind, text, position, end - start));
	}

	fn finish(&mut self) {
		self.advance_to(self.source.len());
		self.pending
			.push_back(Token::new(TokenKind::Eof, "", self.position, 0));
		self.finished = true;
	}

	/// Apply `-` markers and `trim_blocks` to the start of a text run.
	fn trim_leading(&mut self, start: usize, end: usize) -> usize {
		let source = self.source;
		let text = &source[start..end];
		let trimmed = if self.trim_next {
			start + (text.len() - text.trim_start().len())
		} else if self.after_block && self.options.trim_blocks {
			if text.starts_with("\r\n") {
				start + 2
			} else if text.starts_with('\n') {
				start + 1
			} else {
				start
			}
		} else {
			start
		};

		self.trim_next = false;
		self.after_block = false;
		trimmed
	}

	fn lex_data(&mut self) {
		let source = self.source;
		let rest = &source[self.cursor..];
		let Some((index, kind)) = find_tag_open(rest) else {
			let start = self.trim_leading(self.cursor, source.len());
			if start < source.len() {
				let text = &source[start..];
				self.push(TokenKind::Text, start, source.len(), text);
			}
			self.finish();
			return;
		};

		let tag_start = self.cursor + index;
		let start = self.trim_leading(self.cursor, tag_start);
		let marker = source[tag_start + 2..].chars().next();
		let mut end = tag_start;

		if marker == Some('-') {
			end = start + source[start..tag_start].trim_end().len();
		} else if kind != TokenKind::VariableStart
			&& marker != Some('+')
			&& self.options.lstrip_blocks
		{
			end = self.lstrip_end(start, tag_start);
		}

		if end > start {
			let text = &source[start..end];
			self.push(TokenKind::Text, start, end, text);
		}

		self.advance_to(tag_start);
		let width = if matches!(marker, Some('-' | '+')) {
			3
		} else {
			2
		};
		let text = &source[tag_start..tag_start + width];
		self.push(kind, tag_start, tag_start + width, text);
		self.advance_to(tag_start + width);

		self.state = match kind {
			TokenKind::VariableStart => LexerState::Expression,
			TokenKind::CommentStart => LexerState::Comment,
			_ => {
				self.raw = RawCandidate::Opened;
				LexerState::Statement
			}
		};
	}

	/// Find where text should end so that blank indentation before a block tag
	/// is dropped.
	fn lstrip_end(&self, start: usize, tag_start: usize) -> usize {
		let source = self.source;
		let segment = &source[start..tag_start];
		let line_start = segment.rfind('\n').map_or(0, |index| index + 1);
		let tail = &segment[line_start..];

		if !tail.chars().all(|ch| ch == ' ' || ch == '\t') {
			return tag_start;
		}

		let at_line_start = line_start > 0 || start == 0 || source[..start].ends_with('\n');
		if at_line_start {
			start + line_start
		} else {
			tag_start
		}
	}

	fn lex_tag(&mut self) {
		let source = self.source;
		let rest = &source[self.cursor..];
		let mut lexer = RawToken::lexer(rest);
		let Some(result) = lexer.next() else {
			self.finish();
			return;
		};

		let span = lexer.span();
		let start = self.cursor + span.start;
		let mut end = self.cursor + span.end;
		let slice = &rest[span];

		let Ok(raw) = result else {
			self.raw = RawCandidate::None;
			self.push(TokenKind::Unknown, start, end, slice);
			self.advance_to(end);
			return;
		};

		match (self.state, raw) {
			(LexerState::Expression, RawToken::VariableEnd | RawToken::VariableEndTrim) => {
				self.push(TokenKind::VariableEnd, start, end, slice);
				self.advance_to(end);
				self.trim_next = raw == RawToken::VariableEndTrim;
				self.state = LexerState::Data;
				return;
			}
			(LexerState::Statement, RawToken::StatementEnd | RawToken::StatementEndTrim) => {
				self.push(TokenKind::StatementEnd, start, end, slice);
				self.advance_to(end);
				self.trim_next = raw == RawToken::StatementEndTrim;
				self.after_block = true;
				self.state = if self.raw == RawCandidate::Named {
					LexerState::Raw
				} else {
					LexerState::Data
				};
				self.raw = RawCandidate::None;
				return;
			}
			(
				_,
				RawToken::VariableEnd
				| RawToken::VariableEndTrim
				| RawToken::StatementEnd
				| RawToken::StatementEndTrim,
			) => {
				// A closing delimiter of the other tag kind is plain operators here.
				self.raw = RawCandidate::None;
				self.split_delimiter(start, slice);
				self.advance_to(end);
				return;
			}
			_ => {}
		}

		let (kind, text) = match raw {
			RawToken::DoubleQuotedString | RawToken::SingleQuotedString => {
				(TokenKind::String, unescape(&slice[1..slice.len() - 1]))
			}
			RawToken::Name
				if slice.eq_ignore_ascii_case("super") && source[end..].starts_with("()") =>
			{
				end += 2;
				(TokenKind::Super, "super()".to_string())
			}
			other => (other.kind(), slice.to_string()),
		};

		self.raw = if self.raw == RawCandidate::Opened
			&& kind == TokenKind::Name
			&& text.eq_ignore_ascii_case("raw")
		{
			RawCandidate::Named
		} else {
			RawCandidate::None
		};

		self.push(kind, start, end, text);
		self.advance_to(end);
	}

	/// Emit `}}`, `-}}`, `%}` or `-%}` as their individual operator tokens.
	fn split_delimiter(&mut self, start: usize, slice: &str) {
		for (index, ch) in slice.char_indices() {
			let kind = match ch {
				'-' => TokenKind::Sub,
				'%' => TokenKind::Mod,
				_ => TokenKind::RightBrace,
			};
			self.push(kind, start + index, start + index + 1, ch.to_string());
		}
	}

	fn lex_comment(&mut self) {
		let source = self.source;
		let rest = &source[self.cursor..];
		let Some(index) = rest.find("#}") else {
			if !rest.is_empty() {
				self.push(TokenKind::Text, self.cursor, source.len(), rest);
			}
			self.finish();
			return;
		};

		let close = self.cursor + index;
		let trim = rest[..index].ends_with('-');
		let content_end = if trim { close - 1 } else { close };

		if content_end > self.cursor {
			let text = &source[self.cursor..content_end];
			self.push(TokenKind::Text, self.cursor, content_end, text);
		}

		let text = &source[content_end..close + 2];
		self.push(TokenKind::CommentEnd, content_end, close + 2, text);
		self.advance_to(close + 2);
		self.trim_next = trim;
		self.after_block = true;
		self.state = LexerState::Data;
	}

	fn lex_raw(&mut self) {
		let source = self.source;
		let start = self.trim_leading(self.cursor, source.len());
		let rest = &source[self.cursor..];
		let (close, trim) = find_endraw(rest).map_or((source.len(), false), |(index, trim)| {
			(self.cursor + index, trim)
		});

		let start = start.min(close);
		let end = if trim {
			start + source[start..close].trim_end().len()
		} else {
			close
		};

		if end > start {
			let text = &source[start..end];
			self.push(TokenKind::Text, start, end, text);
		}

		self.advance_to(close);
		self.state = LexerState::Data;
	}
}

impl Iterator for Lexer<'_> {
	type Item = Token;

	fn next(&mut self) -> Option<Self::Item> {
		while self.pending.is_empty() && !self.finished {
			match self.state {
				LexerState::Data => self.lex_data(),
				LexerState::Expression | LexerState::Statement => self.lex_tag(),
				LexerState::Comment => self.lex_comment(),
				LexerState::Raw => self.lex_raw(),
			}
		}

		self.pending.pop_front()
	}
}

/// Find the next `{{`, `{%` or `{#` in `text`.
fn find_tag_open(text: &str) -> Option<(usize, TokenKind)> {
	let bytes = text.as_bytes();
	let mut index = 0;

	while let Some(offset) = text[index..].find('{') {
		let at = index + offset;
		let kind = match bytes.get(at + 1) {
			Some(b'{') => Some(TokenKind::VariableStart),
			Some(b'%') => Some(TokenKind::StatementStart),
			Some(b'#') => Some(TokenKind::CommentStart),
			_ => None,
		};

		if let Some(kind) = kind {
			return Some((at, kind));
		}

		index = at + 1;
	}

	None
}

/// Find the `{% endraw` tag closing a raw block. Returns its offset and
/// whether it carries a `-` whitespace marker.
fn find_endraw(text: &str) -> Option<(usize, bool)> {
	for (index, _) in text.match_indices("{%") {
		let after = &text[index + 2..];
		let trim = after.starts_with('-');
		let tail = after.trim_start_matches(['-', '+']).trim_start();

		if tail
			.get(..6)
			.is_some_and(|word| word.eq_ignore_ascii_case("endraw"))
		{
			return Some((index, trim));
		}
	}

	None
}

/// Resolve the escape sequences of a string literal body. Unknown escapes
/// stand for the escaped character.
fn unescape(body: &str) -> String {
	let mut output = String::with_capacity(body.len());
	let mut chars = body.chars();

	while let Some(ch) = chars.next() {
		if ch != '\\' {
			output.push(ch);
			continue;
		}

		match chars.next() {
			Some('n') => output.push('\n'),
			Some('r') => output.push('\r'),
			Some('t') => output.push('\t'),
			Some(other) => output.push(other),
			None => output.push('\\'),
		}
	}

	output
}
