use std::fmt::Display;

use crate::Position;

/// The kind of a lexed token. Keywords are lexed as [`TokenKind::Name`] and
/// recognized by the parser so that words like `block` or `loop` stay usable
/// as variable names.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TokenKind {
	/// Literal template text, comment content or raw block content.
	Text,
	/// `{{`
	VariableStart,
	/// `}}`
	VariableEnd,
	/// `{%`
	StatementStart,
	/// `%}`
	StatementEnd,
	/// `{#`
	CommentStart,
	/// `#}`
	CommentEnd,
	/// An identifier or keyword, e.g. `user` or `endfor`.
	Name,
	/// A string literal with escapes resolved.
	String,
	/// An integer literal, e.g. `42`.
	Integer,
	/// A float literal, e.g. `4.2`.
	Float,
	/// `super()`
	Super,
	/// `|`
	Pipe,
	/// `.`
	Dot,
	/// `,`
	Comma,
	/// `:`
	Colon,
	/// `=`
	Assign,
	/// `==`
	Eq,
	/// `!=`
	Ne,
	/// `<`
	Lt,
	/// `<=`
	Le,
	/// `>`
	Gt,
	/// `>=`
	Ge,
	/// `+`
	Add,
	/// `-`
	Sub,
	/// `*`
	Mul,
	/// `/`
	Div,
	/// `//`
	FloorDiv,
	/// `%`
	Mod,
	/// `**`
	Pow,
	/// `~`
	Tilde,
	/// `(`
	LeftParen,
	/// `)`
	RightParen,
	/// `[`
	LeftBracket,
	/// `]`
	RightBracket,
	/// `{`
	LeftBrace,
	/// `}`
	RightBrace,
	/// Any character the lexer could not classify.
	Unknown,
	/// End of input.
	Eof,
}

impl TokenKind {
	/// Human readable name used in parse errors.
	pub fn describe(self) -> &'static str {
		match self {
			TokenKind::Text => "text",
			TokenKind::VariableStart => "'{{'",
			TokenKind::VariableEnd => "'}}'",
			TokenKind::StatementStart => "'{%'",
			TokenKind::StatementEnd => "'%}'",
			TokenKind::CommentStart => "'{#'",
			TokenKind::CommentEnd => "'#}'",
			TokenKind::Name => "name",
			TokenKind::String => "string",
			TokenKind::Integer => "integer",
			TokenKind::Float => "float",
			TokenKind::Super => "'super()'",
			TokenKind::Pipe => "'|'",
			TokenKind::Dot => "'.'",
			TokenKind::Comma => "','",
			TokenKind::Colon => "':'",
			TokenKind::Assign => "'='",
			TokenKind::Eq => "'=='",
			TokenKind::Ne => "'!='",
			TokenKind::Lt => "'<'",
			TokenKind::Le => "'<='",
			TokenKind::Gt => "'>'",
			TokenKind::Ge => "'>='",
			TokenKind::Add => "'+'",
			TokenKind::Sub => "'-'",
			TokenKind::Mul => "'*'",
			TokenKind::Div => "'/'",
			TokenKind::FloorDiv => "'//'",
			TokenKind::Mod => "'%'",
			TokenKind::Pow => "'**'",
			TokenKind::Tilde => "'~'",
			TokenKind::LeftParen => "'('",
			TokenKind::RightParen => "')'",
			TokenKind::LeftBracket => "'['",
			TokenKind::RightBracket => "']'",
			TokenKind::LeftBrace => "'{'",
			TokenKind::RightBrace => "'}'",
			TokenKind::Unknown => "unknown character",
			TokenKind::Eof => "end of template",
		}
	}
}

/// A single lexed token. `text` holds the token's value: the unescaped
/// content for strings, the literal slice for everything else.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
	pub kind: TokenKind,
	pub text: String,
	pub position: Position,
	/// Length of the token in the source, in bytes.
	pub length: usize,
}

impl Token {
	pub fn new(kind: TokenKind, text: impl Into<String>, position: Position, length: usize) -> Self {
		Self {
			kind,
			text: text.into(),
			position,
			length,
		}
	}

	pub fn offset(&self) -> usize {
		self.position.offset
	}

	pub fn end_offset(&self) -> usize {
		self.position.offset + self.length
	}

	pub fn is(&self, kind: TokenKind) -> bool {
		self.kind == kind
	}

	/// True when this token is the name `keyword`, compared case-insensitively.
	pub fn is_keyword(&self, keyword: &str) -> bool {
		self.kind == TokenKind::Name && self.text.eq_ignore_ascii_case(keyword)
	}

	/// The token as it would appear in an expression, with string literals
	/// re-quoted.
	pub fn source_text(&self) -> String {
		match self.kind {
			TokenKind::String => format!("\"{}\"", self.text.replace('"', "\\\"")),
			_ => self.text.clone(),
		}
	}
}

impl Display for Token {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		match self.kind {
			TokenKind::Eof => write!(f, "{}", self.kind.describe()),
			_ => write!(f, "{} ('{}')", self.kind.describe(), self.text),
		}
	}
}
