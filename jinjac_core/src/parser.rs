use std::sync::Arc;

use tracing::debug;

use crate::JinjacError;
use crate::JinjacResult;
use crate::Position;
use crate::ast::AutoescapeNode;
use crate::ast::BlockNode;
use crate::ast::CommentNode;
use crate::ast::ElifBranch;
use crate::ast::Expr;
use crate::ast::ExtendsNode;
use crate::ast::FilterBlockNode;
use crate::ast::FilterCall;
use crate::ast::ForNode;
use crate::ast::FromImportNode;
use crate::ast::IfNode;
use crate::ast::ImportName;
use crate::ast::ImportNode;
use crate::ast::IncludeNode;
use crate::ast::MacroCallNode;
use crate::ast::MacroDef;
use crate::ast::MacroNode;
use crate::ast::MacroParam;
use crate::ast::Node;
use crate::ast::RawNode;
use crate::ast::SetNode;
use crate::ast::SetTarget;
use crate::ast::SetValue;
use crate::ast::SuperNode;
use crate::ast::Template;
use crate::ast::TextNode;
use crate::ast::VariableNode;
use crate::ast::WithNode;
use crate::lexer::LexerOptions;
use crate::lexer::tokenize_expression;
use crate::lexer::tokenize_with;
use crate::tokens::Token;
use crate::tokens::TokenKind;

/// Parse a token stream into a [`Template`].
pub fn parse(tokens: impl IntoIterator<Item = Token>, template_name: &str) -> JinjacResult<Template> {
	Parser::new(tokens, template_name).parse_template()
}

/// Lex and parse template source in one step.
pub fn parse_source(
	source: &str,
	template_name: &str,
	options: LexerOptions,
) -> JinjacResult<Template> {
	parse(tokenize_with(source, options), template_name)
}

/// Parse a bare expression, e.g. `items|length > 2`.
pub fn parse_expression(source: &str) -> JinjacResult<Expr> {
	let mut parser = Parser::new(tokenize_expression(source), "<expression>");
	let expr = parser.parse_expression()?;
	parser.expect(TokenKind::Eof, "end of expression")?;
	Ok(expr)
}

/// Recursive descent parser over a buffered token stream with a single
/// lookahead cursor.
pub struct Parser {
	pub(crate) tokens: Vec<Token>,
	pub(crate) cursor: usize,
	pub(crate) template: String,
}

impl Parser {
	pub fn new(tokens: impl IntoIterator<Item = Token>, template_name: &str) -> Self {
		let mut tokens: Vec<Token> = tokens.into_iter().collect();
		if !tokens.last().is_some_and(|token| token.is(TokenKind::Eof)) {
			let position = tokens
				.last()
				.map(|token| token.position.advanced(&token.text))
				.unwrap_or_default();
			tokens.push(Token::new(TokenKind::Eof, "", position, 0));
		}

		Self {
			tokens,
			cursor: 0,
			template: template_name.to_string(),
		}
	}

	pub fn parse_template(mut self) -> JinjacResult<Template> {
		let nodes = self.parse_nodes(&[])?;
		Ok(Template {
			name: self.template,
			nodes,
		})
	}

	pub(crate) fn current(&self) -> &Token {
		let last = self.tokens.len() - 1;
		&self.tokens[self.cursor.min(last)]
	}

	pub(crate) fn peek(&self, distance: usize) -> &Token {
		let last = self.tokens.len() - 1;
		&self.tokens[(self.cursor + distance).min(last)]
	}

	pub(crate) fn advance(&mut self) -> Token {
		let token = self.current().clone();
		if self.cursor < self.tokens.len() {
			self.cursor += 1;
		}
		token
	}

	pub(crate) fn check(&self, kind: TokenKind) -> bool {
		self.current().is(kind)
	}

	pub(crate) fn check_keyword(&self, keyword: &str) -> bool {
		self.current().is_keyword(keyword)
	}

	/// Consume the current token when it has the given kind.
	pub(crate) fn eat(&mut self, kind: TokenKind) -> bool {
		if self.check(kind) {
			self.advance();
			true
		} else {
			false
		}
	}

	/// Consume the current token when it is the given keyword.
	pub(crate) fn eat_keyword(&mut self, keyword: &str) -> bool {
		if self.check_keyword(keyword) {
			self.advance();
			true
		} else {
			false
		}
	}

	pub(crate) fn error(&self, message: impl Into<String>) -> JinjacError {
		let token = self.current();
		JinjacError::parse(message, &self.template, token.position, token.text.clone())
	}

	pub(crate) fn unexpected(&self, expected: &str) -> JinjacError {
		self.error(format!("Expected {expected}, got {}", self.current()))
	}

	pub(crate) fn expect(&mut self, kind: TokenKind, expected: &str) -> JinjacResult<Token> {
		if self.check(kind) {
			Ok(self.advance())
		} else {
			Err(self.unexpected(expected))
		}
	}

	pub(crate) fn expect_keyword(&mut self, keyword: &str) -> JinjacResult<Token> {
		if self.check_keyword(keyword) {
			Ok(self.advance())
		} else {
			Err(self.unexpected(&format!("'{keyword}'")))
		}
	}

	pub(crate) fn expect_name(&mut self, expected: &str) -> JinjacResult<String> {
		Ok(self.expect(TokenKind::Name, expected)?.text)
	}

	fn end_statement(&mut self) -> JinjacResult<()> {
		self.expect(TokenKind::StatementEnd, "'%}'")?;
		Ok(())
	}

	/// True when the next tokens are `{%` followed by one of `keywords`.
	fn at_statement(&self, keywords: &[&str]) -> bool {
		self.check(TokenKind::StatementStart)
			&& keywords
				.iter()
				.any(|keyword| self.peek(1).is_keyword(keyword))
	}

	/// Parse nodes until a statement opening with one of `until` is reached.
	/// The boundary is left for the caller to consume.
	fn parse_nodes(&mut self, until: &[&str]) -> JinjacResult<Vec<Node>> {
		let mut nodes = vec![];

		loop {
			if self.at_statement(until) {
				return Ok(nodes);
			}

			let token = self.current().clone();
			match token.kind {
				TokenKind::Eof => {
					if until.is_empty() {
						return Ok(nodes);
					}
					let expected = until
						.iter()
						.map(|keyword| format!("'{{% {keyword} %}}'"))
						.collect::<Vec<_>>()
						.join(" or ");
					return Err(self.unexpected(&expected));
				}
				TokenKind::Text => {
					self.advance();
					nodes.push(Node::Text(TextNode {
						text: token.text,
						position: token.position,
					}));
				}
				TokenKind::VariableStart => nodes.push(self.parse_variable()?),
				TokenKind::CommentStart => nodes.push(self.parse_comment()?),
				TokenKind::StatementStart => {
					if let Some(node) = self.parse_statement()? {
						nodes.push(node);
					}
				}
				_ => {
					self.advance();
				}
			}
		}
	}

	/// Consume `{% keyword [name] %}` closing a block.
	fn parse_closing(&mut self, keyword: &str, name: Option<&str>) -> JinjacResult<()> {
		self.expect(TokenKind::StatementStart, "'{%'")?;
		self.expect_keyword(keyword)?;

		if let Some(name) = name {
			if self.check(TokenKind::Name) {
				let closing = self.advance();
				if !closing.text.eq_ignore_ascii_case(name) {
					return Err(JinjacError::parse(
						format!("Expected '{keyword} {name}', got '{keyword} {}'", closing.text),
						&self.template,
						closing.position,
						closing.text,
					));
				}
			}
		}

		self.end_statement()
	}

	fn parse_variable(&mut self) -> JinjacResult<Node> {
		let start = self.expect(TokenKind::VariableStart, "'{{'")?;

		if self.check(TokenKind::Super) && self.peek(1).is(TokenKind::VariableEnd) {
			self.advance();
			self.advance();
			return Ok(Node::Super(SuperNode {
				position: start.position,
			}));
		}

		let first = self.cursor;
		let mut expr = self.parse_expression()?;
		let last = self.cursor;
		self.expect(TokenKind::VariableEnd, "'}}'")?;

		let mut filters = vec![];
		while let Expr::Filter { target, filter } = expr {
			filters.push(filter);
			expr = *target;
		}
		filters.reverse();

		let end = filters.first().map_or(last, |filter| {
			self.tokens[first..last]
				.iter()
				.position(|token| token.offset() >= filter.position.offset)
				.map_or(last, |index| first + index)
		});

		Ok(Node::Variable(VariableNode {
			expr,
			source: self.source_between(first, end),
			filters,
			position: start.position,
		}))
	}

	/// Rebuild the source text of the tokens in `start..end`.
	fn source_between(&self, start: usize, end: usize) -> String {
		let mut source = String::new();
		let mut previous: Option<&Token> = None;

		for token in &self.tokens[start..end] {
			if previous.is_some_and(|previous| token.offset() > previous.end_offset()) {
				source.push(' ');
			}
			source.push_str(&token.source_text());
			previous = Some(token);
		}

		source
	}

	fn parse_comment(&mut self) -> JinjacResult<Node> {
		let start = self.expect(TokenKind::CommentStart, "'{#'")?;
		let text = if self.check(TokenKind::Text) {
			self.advance().text
		} else {
			String::new()
		};
		self.expect(TokenKind::CommentEnd, "'#}'")?;

		Ok(Node::Comment(CommentNode {
			text,
			position: start.position,
		}))
	}

	fn parse_statement(&mut self) -> JinjacResult<Option<Node>> {
		let start = self.expect(TokenKind::StatementStart, "'{%'")?;
		let position = start.position;

		if !self.check(TokenKind::Name) {
			self.skip_statement();
			return Ok(None);
		}

		let keyword = self.current().text.to_ascii_lowercase();
		let node = match keyword.as_str() {
			"extends" => self.parse_extends(position)?,
			"block" => self.parse_block(position)?,
			"include" => self.parse_include(position)?,
			"import" => self.parse_import(position)?,
			"from" => self.parse_from_import(position)?,
			"if" => self.parse_if(position)?,
			"for" => self.parse_for(position)?,
			"set" => self.parse_set(position)?,
			"macro" => self.parse_macro(position)?,
			"call" => self.parse_call(position)?,
			"raw" => self.parse_raw(position)?,
			"with" => self.parse_with(position)?,
			"autoescape" => self.parse_autoescape(position)?,
			"filter" => self.parse_filter_block(position)?,
			_ => {
				debug!(
					template = %self.template,
					statement = %keyword,
					"skipping unknown statement"
				);
				self.skip_statement();
				return Ok(None);
			}
		};

		Ok(Some(node))
	}

	/// Skip everything up to and including the next `%}`.
	fn skip_statement(&mut self) {
		while !self.check(TokenKind::Eof) {
			if self.advance().is(TokenKind::StatementEnd) {
				return;
			}
		}
	}

	fn parse_extends(&mut self, position: Position) -> JinjacResult<Node> {
		self.expect_keyword("extends")?;
		let path = self.expect(TokenKind::String, "template path string")?.text;
		self.end_statement()?;

		Ok(Node::Extends(ExtendsNode { path, position }))
	}

	fn parse_block(&mut self, position: Position) -> JinjacResult<Node> {
		self.expect_keyword("block")?;
		let name = self.expect_name("block name")?;
		let scoped = self.eat_keyword("scoped");
		self.end_statement()?;

		let body = self.parse_nodes(&["endblock"])?;
		self.parse_closing("endblock", Some(&name))?;

		Ok(Node::Block(BlockNode {
			name,
			body,
			scoped,
			position,
		}))
	}

	fn parse_include(&mut self, position: Position) -> JinjacResult<Node> {
		self.expect_keyword("include")?;
		let target = self.parse_expression()?;
		let mut ignore_missing = false;
		let mut with_context = true;

		loop {
			if self.check_keyword("ignore") && self.peek(1).is_keyword("missing") {
				self.advance();
				self.advance();
				ignore_missing = true;
			} else if let Some(context) = self.parse_context_modifier()? {
				with_context = context;
			} else {
				break;
			}
		}

		self.end_statement()?;

		Ok(Node::Include(IncludeNode {
			target,
			ignore_missing,
			with_context,
			position,
		}))
	}

	/// Parse an optional `with context` / `without context` modifier.
	fn parse_context_modifier(&mut self) -> JinjacResult<Option<bool>> {
		let with = if self.check_keyword("with") {
			true
		} else if self.check_keyword("without") {
			false
		} else {
			return Ok(None);
		};

		self.advance();
		self.expect_keyword("context")?;
		Ok(Some(with))
	}

	fn parse_import(&mut self, position: Position) -> JinjacResult<Node> {
		self.expect_keyword("import")?;
		let target = self.parse_expression()?;
		self.expect_keyword("as")?;
		let alias = self.expect_name("import alias")?;
		self.parse_context_modifier()?;
		self.end_statement()?;

		Ok(Node::Import(ImportNode {
			target,
			alias,
			position,
		}))
	}

	fn parse_from_import(&mut self, position: Position) -> JinjacResult<Node> {
		self.expect_keyword("from")?;
		let target = self.parse_expression()?;
		self.expect_keyword("import")?;

		let mut names = vec![];
		loop {
			if !names.is_empty() && (self.check_keyword("with") || self.check_keyword("without")) {
				break;
			}

			let name = self.expect_name("macro name")?;
			let alias = if self.eat_keyword("as") {
				Some(self.expect_name("import alias")?)
			} else {
				None
			};
			names.push(ImportName { name, alias });

			if !self.eat(TokenKind::Comma) {
				break;
			}
		}

		self.parse_context_modifier()?;
		self.end_statement()?;

		Ok(Node::FromImport(FromImportNode {
			target,
			names,
			position,
		}))
	}

	fn parse_if(&mut self, position: Position) -> JinjacResult<Node> {
		self.expect_keyword("if")?;
		let condition = self.parse_expression()?;
		self.end_statement()?;

		let branches = ["elif", "else", "endif"];
		let body = self.parse_nodes(&branches)?;
		let mut elifs = vec![];
		let mut else_body = None;

		loop {
			let start = self.expect(TokenKind::StatementStart, "'{%'")?;
			let keyword = self.expect_name("'elif', 'else' or 'endif'")?;

			match keyword.to_ascii_lowercase().as_str() {
				"elif" => {
					let condition = self.parse_expression()?;
					self.end_statement()?;
					let body = self.parse_nodes(&branches)?;
					elifs.push(ElifBranch {
						condition,
						body,
						position: start.position,
					});
				}
				"else" => {
					self.end_statement()?;
					else_body = Some(self.parse_nodes(&["endif"])?);
					self.parse_closing("endif", None)?;
					break;
				}
				_ => {
					self.end_statement()?;
					break;
				}
			}
		}

		Ok(Node::If(IfNode {
			condition,
			body,
			elifs,
			else_body,
			position,
		}))
	}

	fn parse_for(&mut self, position: Position) -> JinjacResult<Node> {
		self.expect_keyword("for")?;
		let first = self.expect_name("loop variable")?;
		let (index_target, target) = if self.eat(TokenKind::Comma) {
			(Some(first), self.expect_name("loop variable")?)
		} else {
			(None, first)
		};

		self.expect_keyword("in")?;
		let iterable = self.parse_boolean()?;
		let filter = if self.eat_keyword("if") {
			Some(self.parse_boolean()?)
		} else {
			None
		};
		let recursive = self.eat_keyword("recursive");
		self.end_statement()?;

		let body = self.parse_nodes(&["else", "endfor"])?;
		let else_body = if self.at_statement(&["else"]) {
			self.advance();
			self.advance();
			self.end_statement()?;
			Some(self.parse_nodes(&["endfor"])?)
		} else {
			None
		};
		self.parse_closing("endfor", None)?;

		Ok(Node::For(ForNode {
			target,
			index_target,
			iterable,
			filter,
			body,
			else_body,
			recursive,
			position,
		}))
	}

	fn parse_set(&mut self, position: Position) -> JinjacResult<Node> {
		self.expect_keyword("set")?;
		let name = self.expect_name("variable name")?;
		let target = if self.eat(TokenKind::Dot) {
			SetTarget::Attribute(name, self.expect_name("attribute name")?)
		} else {
			SetTarget::Name(name)
		};

		let value = if self.eat(TokenKind::Assign) {
			let expr = self.parse_expression()?;
			self.end_statement()?;
			SetValue::Expr(expr)
		} else {
			self.end_statement()?;
			let body = self.parse_nodes(&["endset"])?;
			self.parse_closing("endset", None)?;
			SetValue::Block(body)
		};

		Ok(Node::Set(SetNode {
			target,
			value,
			position,
		}))
	}

	/// Parse `(a, b=default, ...)` parameter lists of macros and call blocks.
	fn parse_params(&mut self) -> JinjacResult<Vec<MacroParam>> {
		let mut params = vec![];
		self.expect(TokenKind::LeftParen, "'('")?;

		while !self.check(TokenKind::RightParen) {
			let name = self.expect_name("parameter name")?;
			let default = if self.eat(TokenKind::Assign) {
				Some(self.parse_expression()?)
			} else {
				None
			};
			params.push(MacroParam { name, default });

			if !self.eat(TokenKind::Comma) {
				break;
			}
		}

		self.expect(TokenKind::RightParen, "')'")?;
		Ok(params)
	}

	fn parse_macro(&mut self, position: Position) -> JinjacResult<Node> {
		self.expect_keyword("macro")?;
		let name = self.expect_name("macro name")?;
		let params = if self.check(TokenKind::LeftParen) {
			self.parse_params()?
		} else {
			vec![]
		};
		self.end_statement()?;

		let body = self.parse_nodes(&["endmacro"])?;
		self.parse_closing("endmacro", Some(&name))?;

		Ok(Node::Macro(MacroNode {
			def: Arc::new(MacroDef {
				name,
				params,
				body,
				position,
			}),
		}))
	}

	fn parse_call(&mut self, position: Position) -> JinjacResult<Node> {
		self.expect_keyword("call")?;
		let params = if self.check(TokenKind::LeftParen) {
			self.parse_params()?
		} else {
			vec![]
		};

		let call = self.parse_expression()?;
		if !matches!(call, Expr::Call { .. }) {
			return Err(self.unexpected("macro call"));
		}
		self.end_statement()?;

		let body = self.parse_nodes(&["endcall"])?;
		self.parse_closing("endcall", None)?;

		Ok(Node::MacroCall(MacroCallNode {
			call,
			caller: Arc::new(MacroDef {
				name: "caller".to_string(),
				params,
				body,
				position,
			}),
			position,
		}))
	}

	fn parse_raw(&mut self, position: Position) -> JinjacResult<Node> {
		self.expect_keyword("raw")?;
		self.end_statement()?;

		let text = if self.check(TokenKind::Text) {
			self.advance().text
		} else {
			String::new()
		};
		self.parse_closing("endraw", None)?;

		Ok(Node::Raw(RawNode { text, position }))
	}

	fn parse_with(&mut self, position: Position) -> JinjacResult<Node> {
		self.expect_keyword("with")?;
		let mut bindings = vec![];

		while self.check(TokenKind::Name) {
			let name = self.expect_name("variable name")?;
			self.expect(TokenKind::Assign, "'='")?;
			bindings.push((name, self.parse_expression()?));

			if !self.eat(TokenKind::Comma) {
				break;
			}
		}

		self.end_statement()?;
		let body = self.parse_nodes(&["endwith"])?;
		self.parse_closing("endwith", None)?;

		Ok(Node::With(WithNode {
			bindings,
			body,
			position,
		}))
	}

	fn parse_autoescape(&mut self, position: Position) -> JinjacResult<Node> {
		self.expect_keyword("autoescape")?;
		let enabled = self.parse_expression()?;
		self.end_statement()?;

		let body = self.parse_nodes(&["endautoescape"])?;
		self.parse_closing("endautoescape", None)?;

		Ok(Node::Autoescape(AutoescapeNode {
			enabled,
			body,
			position,
		}))
	}

	fn parse_filter_block(&mut self, position: Position) -> JinjacResult<Node> {
		self.expect_keyword("filter")?;
		let mut filters: Vec<FilterCall> = vec![self.parse_filter_call()?];
		while self.eat(TokenKind::Pipe) {
			filters.push(self.parse_filter_call()?);
		}
		self.end_statement()?;

		let body = self.parse_nodes(&["endfilter"])?;
		self.parse_closing("endfilter", None)?;

		Ok(Node::FilterBlock(FilterBlockNode {
			filters,
			body,
			position,
		}))
	}
}
