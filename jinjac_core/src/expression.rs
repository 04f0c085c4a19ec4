use crate::JinjacResult;
use crate::Value;
use crate::ast::BinaryOp;
use crate::ast::Expr;
use crate::ast::FilterCall;
use crate::ast::UnaryOp;
use crate::parser::Parser;
use crate::tokens::TokenKind;

/// Names that end an expression when they appear where an operator could.
const CLAUSE_KEYWORDS: [&str; 4] = ["and", "or", "else", "if"];

impl Parser {
	/// Parse a full expression, including the inline `a if cond else b` form.
	pub(crate) fn parse_expression(&mut self) -> JinjacResult<Expr> {
		let then = self.parse_boolean()?;

		if !self.eat_keyword("if") {
			return Ok(then);
		}

		let condition = self.parse_boolean()?;
		let otherwise = if self.eat_keyword("else") {
			Some(Box::new(self.parse_expression()?))
		} else {
			None
		};

		Ok(Expr::Conditional {
			condition: Box::new(condition),
			then: Box::new(then),
			otherwise,
		})
	}

	/// Boolean chains split at the first operator. `and` is the loosest
	/// operator, so `a or b and c` is `(a or b) and c`.
	pub(crate) fn parse_boolean(&mut self) -> JinjacResult<Expr> {
		let left = self.parse_or()?;

		if self.eat_keyword("and") {
			let right = self.parse_boolean()?;
			return Ok(binary(BinaryOp::And, left, right));
		}

		Ok(left)
	}

	fn parse_or(&mut self) -> JinjacResult<Expr> {
		let left = self.parse_comparison()?;

		if self.eat_keyword("or") {
			let right = self.parse_or()?;
			return Ok(binary(BinaryOp::Or, left, right));
		}

		Ok(left)
	}

	/// Comparisons split at the first operator; `is` tests bind to the operand
	/// on their left.
	fn parse_comparison(&mut self) -> JinjacResult<Expr> {
		let mut left = self.parse_additive()?;

		loop {
			let kind = self.current().kind;
			let op = match kind {
				TokenKind::Eq => Some(BinaryOp::Eq),
				TokenKind::Ne => Some(BinaryOp::Ne),
				TokenKind::Lt => Some(BinaryOp::Lt),
				TokenKind::Le => Some(BinaryOp::Le),
				TokenKind::Gt => Some(BinaryOp::Gt),
				TokenKind::Ge => Some(BinaryOp::Ge),
				TokenKind::Name if self.check_keyword("in") => Some(BinaryOp::In),
				TokenKind::Name if self.check_keyword("not") && self.peek(1).is_keyword("in") => {
					self.advance();
					Some(BinaryOp::NotIn)
				}
				_ => None,
			};

			if let Some(op) = op {
				self.advance();
				let right = self.parse_comparison()?;
				return Ok(binary(op, left, right));
			}

			if self.eat_keyword("is") {
				left = self.parse_test(left)?;
				continue;
			}

			return Ok(left);
		}
	}

	fn parse_test(&mut self, target: Expr) -> JinjacResult<Expr> {
		let negated = self.eat_keyword("not");
		let kind = self.current().kind;
		let name = match kind {
			TokenKind::Name => self.advance().text,
			TokenKind::Eq | TokenKind::Ne | TokenKind::Lt | TokenKind::Le | TokenKind::Gt | TokenKind::Ge => {
				self.advance().text
			}
			_ => return Err(self.unexpected("test name")),
		};

		let args = if self.check(TokenKind::LeftParen) {
			let (args, _) = self.parse_call_args()?;
			args
		} else if matches!(
			self.current().kind,
			TokenKind::Integer | TokenKind::Float | TokenKind::String
		) || (self.check(TokenKind::Name) && !self.at_clause_keyword())
		{
			vec![self.parse_primary()?]
		} else {
			vec![]
		};

		Ok(Expr::Test {
			target: Box::new(target),
			name,
			args,
			negated,
		})
	}

	fn at_clause_keyword(&self) -> bool {
		CLAUSE_KEYWORDS
			.iter()
			.any(|keyword| self.check_keyword(keyword))
			|| self.check_keyword("is")
			|| self.check_keyword("in")
			|| self.check_keyword("not")
			|| self.check_keyword("recursive")
	}

	/// `+` and `-` split at the last operator: `10 - 3 - 2` is `(10 - 3) - 2`.
	fn parse_additive(&mut self) -> JinjacResult<Expr> {
		let mut left = self.parse_multiplicative()?;

		loop {
			let op = match self.current().kind {
				TokenKind::Add => BinaryOp::Add,
				TokenKind::Sub => BinaryOp::Sub,
				_ => return Ok(left),
			};
			self.advance();
			let right = self.parse_multiplicative()?;
			left = binary(op, left, right);
		}
	}

	fn parse_multiplicative(&mut self) -> JinjacResult<Expr> {
		let mut left = self.parse_concat()?;

		loop {
			let op = match self.current().kind {
				TokenKind::Mul => BinaryOp::Mul,
				TokenKind::Div => BinaryOp::Div,
				TokenKind::FloorDiv => BinaryOp::FloorDiv,
				TokenKind::Mod => BinaryOp::Mod,
				_ => return Ok(left),
			};
			self.advance();
			let right = self.parse_concat()?;
			left = binary(op, left, right);
		}
	}

	fn parse_concat(&mut self) -> JinjacResult<Expr> {
		let mut left = self.parse_unary()?;

		while self.eat(TokenKind::Tilde) {
			let right = self.parse_unary()?;
			left = binary(BinaryOp::Concat, left, right);
		}

		Ok(left)
	}

	/// Prefix `not`, `-` and `+` bind tighter than every binary operator
	/// except `**`: `not 1 == 2` is `(not 1) == 2`.
	fn parse_unary(&mut self) -> JinjacResult<Expr> {
		let op = match self.current().kind {
			TokenKind::Sub => UnaryOp::Neg,
			TokenKind::Add => UnaryOp::Pos,
			TokenKind::Name if self.check_keyword("not") => UnaryOp::Not,
			_ => return self.parse_power(),
		};
		self.advance();
		let operand = self.parse_unary()?;

		Ok(Expr::Unary {
			op,
			operand: Box::new(operand),
		})
	}

	fn parse_power(&mut self) -> JinjacResult<Expr> {
		let base = self.parse_postfix()?;

		if self.eat(TokenKind::Pow) {
			let exponent = self.parse_unary()?;
			return Ok(binary(BinaryOp::Pow, base, exponent));
		}

		Ok(base)
	}

	fn parse_postfix(&mut self) -> JinjacResult<Expr> {
		let mut expr = self.parse_primary()?;

		loop {
			let kind = self.current().kind;
			match kind {
				TokenKind::Dot => {
					self.advance();
					let name_kind = self.current().kind;
					let name = match name_kind {
						TokenKind::Name | TokenKind::Integer => self.advance().text,
						_ => return Err(self.unexpected("attribute name")),
					};
					expr = Expr::Attribute {
						target: Box::new(expr),
						name,
					};
				}
				TokenKind::LeftBracket => {
					self.advance();
					let index = self.parse_expression()?;
					self.expect(TokenKind::RightBracket, "']'")?;
					expr = Expr::Index {
						target: Box::new(expr),
						index: Box::new(index),
					};
				}
				TokenKind::LeftParen => {
					let (args, kwargs) = self.parse_call_args()?;
					expr = Expr::Call {
						target: Box::new(expr),
						args,
						kwargs,
					};
				}
				TokenKind::Pipe => {
					let pipe = self.advance();
					let mut filter = self.parse_filter_call()?;
					filter.position = pipe.position;
					expr = Expr::Filter {
						target: Box::new(expr),
						filter,
					};
				}
				_ => return Ok(expr),
			}
		}
	}

	/// Parse `name` or `name(args)` after a pipe or in a `filter` block.
	pub(crate) fn parse_filter_call(&mut self) -> JinjacResult<FilterCall> {
		let position = self.current().position;
		let name = self.expect_name("filter name")?;
		let (args, kwargs) = if self.check(TokenKind::LeftParen) {
			self.parse_call_args()?
		} else {
			(vec![], vec![])
		};

		Ok(FilterCall {
			name,
			args,
			kwargs,
			position,
		})
	}

	/// Parse a parenthesized argument list. `name=value` entries become keyword
	/// arguments.
	#[allow(clippy::type_complexity)]
	fn parse_call_args(&mut self) -> JinjacResult<(Vec<Expr>, Vec<(String, Expr)>)> {
		self.expect(TokenKind::LeftParen, "'('")?;
		let mut args = vec![];
		let mut kwargs = vec![];

		while !self.check(TokenKind::RightParen) {
			if self.check(TokenKind::Name) && self.peek(1).is(TokenKind::Assign) {
				let name = self.advance().text;
				self.advance();
				kwargs.push((name, self.parse_expression()?));
			} else {
				args.push(self.parse_expression()?);
			}

			if !self.eat(TokenKind::Comma) {
				break;
			}
		}

		self.expect(TokenKind::RightParen, "')'")?;
		Ok((args, kwargs))
	}

	pub(crate) fn parse_primary(&mut self) -> JinjacResult<Expr> {
		let token = self.current().clone();

		let expr = match token.kind {
			TokenKind::String => {
				self.advance();
				let mut text = token.text;
				while self.check(TokenKind::String) {
					text.push_str(&self.advance().text);
				}
				return Ok(Expr::Literal(Value::String(text)));
			}
			TokenKind::Integer => {
				token
					.text
					.parse::<i64>()
					.map(Value::Int)
					.or_else(|_| token.text.parse::<f64>().map(Value::Float))
					.map(Expr::Literal)
					.map_err(|_| self.unexpected("number"))?
			}
			TokenKind::Float => {
				token
					.text
					.parse::<f64>()
					.map(|value| Expr::Literal(Value::Float(value)))
					.map_err(|_| self.unexpected("number"))?
			}
			TokenKind::Name => {
				match token.text.as_str() {
					"true" | "True" | "TRUE" => Expr::Literal(Value::Bool(true)),
					"false" | "False" | "FALSE" => Expr::Literal(Value::Bool(false)),
					"none" | "None" | "null" | "NONE" => Expr::Literal(Value::Null),
					_ => Expr::Name(token.text),
				}
			}
			TokenKind::Super => Expr::Super,
			TokenKind::LeftParen => return self.parse_parenthesized(),
			TokenKind::LeftBracket => return self.parse_list(),
			TokenKind::LeftBrace => return self.parse_dict(),
			_ => return Err(self.unexpected("expression")),
		};

		self.advance();
		Ok(expr)
	}

	/// `(expr)` or a tuple `(a, b)`, which becomes a list.
	fn parse_parenthesized(&mut self) -> JinjacResult<Expr> {
		self.expect(TokenKind::LeftParen, "'('")?;

		if self.eat(TokenKind::RightParen) {
			return Ok(Expr::List(vec![]));
		}

		let first = self.parse_expression()?;
		if !self.check(TokenKind::Comma) {
			self.expect(TokenKind::RightParen, "')'")?;
			return Ok(first);
		}

		let mut items = vec![first];
		while self.eat(TokenKind::Comma) {
			if self.check(TokenKind::RightParen) {
				break;
			}
			items.push(self.parse_expression()?);
		}
		self.expect(TokenKind::RightParen, "')'")?;

		Ok(Expr::List(items))
	}

	fn parse_list(&mut self) -> JinjacResult<Expr> {
		self.expect(TokenKind::LeftBracket, "'['")?;
		let mut items = vec![];

		while !self.check(TokenKind::RightBracket) {
			items.push(self.parse_expression()?);
			if !self.eat(TokenKind::Comma) {
				break;
			}
		}

		self.expect(TokenKind::RightBracket, "']'")?;
		Ok(Expr::List(items))
	}

	fn parse_dict(&mut self) -> JinjacResult<Expr> {
		self.expect(TokenKind::LeftBrace, "'{'")?;
		let mut entries = vec![];

		while !self.check(TokenKind::RightBrace) {
			let key = self.parse_expression()?;
			self.expect(TokenKind::Colon, "':'")?;
			let value = self.parse_expression()?;
			entries.push((key, value));

			if !self.eat(TokenKind::Comma) {
				break;
			}
		}

		self.expect(TokenKind::RightBrace, "'}'")?;
		Ok(Expr::Dict(entries))
	}
}

fn binary(op: BinaryOp, left: Expr, right: Expr) -> Expr {
	Expr::Binary {
		op,
		left: Box::new(left),
		right: Box::new(right),
	}
}
