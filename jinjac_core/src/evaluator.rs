use std::cmp::Ordering;
use std::sync::Arc;

use tracing::debug;

use crate::FilterArgs;
use crate::FilterRegistry;
use crate::JinjacError;
use crate::JinjacResult;
use crate::Position;
use crate::RenderContext;
use crate::Value;
use crate::ValueMap;
use crate::ast::BinaryOp;
use crate::ast::Expr;
use crate::ast::FilterCall;
use crate::ast::UnaryOp;
use crate::filters::capitalize_word;
use crate::filters::printf;
use crate::filters::repeat_count;
use crate::filters::title_case;
use crate::parser::parse_expression;
use crate::testers::run_test;
use crate::value::Cycler;
use crate::value::Joiner;
use crate::value::MacroRef;
use crate::value::Namespace;

/// Largest list `range()` may produce.
const MAX_RANGE: i64 = 100_000;

const LIPSUM_WORDS: &[&str] = &[
	"lorem", "ipsum", "dolor", "sit", "amet", "consectetur", "adipiscing", "elit", "sed", "do",
	"eiusmod", "tempor", "incididunt", "ut", "labore", "et", "dolore", "magna", "aliqua", "enim",
	"ad", "minim", "veniam", "quis", "nostrud", "exercitation", "ullamco", "laboris", "nisi",
	"aliquip", "ex", "ea", "commodo", "consequat", "duis", "aute", "irure", "in", "reprehenderit",
	"voluptate", "velit", "esse", "cillum", "eu", "fugiat", "nulla", "pariatur", "excepteur",
	"sint", "occaecat", "cupidatat", "non", "proident", "sunt", "culpa", "qui", "officia",
	"deserunt", "mollit", "anim", "id", "est", "laborum",
];

/// Operations an expression needs from the render in progress.
pub trait RenderHooks {
	/// Invoke a macro with evaluated arguments. `context` is the caller's
	/// context, used to evaluate parameter defaults.
	fn call_macro(
		&mut self,
		reference: &MacroRef,
		args: Vec<Value>,
		kwargs: ValueMap,
		caller: Option<Value>,
		context: &RenderContext,
	) -> JinjacResult<Value>;

	/// Render the parent definition of the block currently being rendered.
	/// `position` locates the `super()` call.
	fn render_super(&mut self, context: &RenderContext, position: Position) -> JinjacResult<Value>;

	/// Render the body of the innermost recursive loop over `items`.
	fn recurse_loop(&mut self, items: Value, context: &RenderContext, position: Position) -> JinjacResult<Value>;

	/// Note a static asset referenced through `url_for`.
	fn record_asset(&mut self, path: &str);
}

/// Hooks for expressions evaluated outside of a template render.
#[derive(Debug, Default)]
pub struct Detached {
	pub assets: Vec<String>,
}

impl RenderHooks for Detached {
	fn call_macro(
		&mut self,
		reference: &MacroRef,
		_: Vec<Value>,
		_: ValueMap,
		_: Option<Value>,
		_: &RenderContext,
	) -> JinjacResult<Value> {
		Err(JinjacError::render(
			format!("macro '{}' can only be called while rendering", reference.def.name),
			&reference.template,
			reference.def.position,
		))
	}

	fn render_super(&mut self, _: &RenderContext, position: Position) -> JinjacResult<Value> {
		Err(JinjacError::render(
			"super() can only be called inside a block",
			"<expression>",
			position,
		))
	}

	fn recurse_loop(&mut self, _: Value, _: &RenderContext, position: Position) -> JinjacResult<Value> {
		Err(JinjacError::render(
			"loop() can only be called inside a recursive loop",
			"<expression>",
			position,
		))
	}

	fn record_asset(&mut self, path: &str) {
		self.assets.push(path.to_string());
	}
}

/// Evaluates expression trees against a [`RenderContext`].
///
/// An evaluator is cheap to build and is created for each node so errors carry
/// the node's template and position.
#[derive(Debug, Clone)]
pub struct Evaluator<'a> {
	filters: &'a FilterRegistry,
	template: Arc<str>,
	position: Position,
	static_prefix: &'a str,
}

impl<'a> Evaluator<'a> {
	pub fn new(filters: &'a FilterRegistry, template: Arc<str>, static_prefix: &'a str) -> Self {
		Self {
			filters,
			template,
			position: Position::default(),
			static_prefix,
		}
	}

	#[must_use]
	pub fn at(mut self, position: Position) -> Self {
		self.position = position;
		self
	}

	pub fn template(&self) -> &str {
		&self.template
	}

	fn error(&self, message: impl Into<String>) -> JinjacError {
		JinjacError::render(message, &self.template, self.position)
	}

	/// Parse and evaluate `source` outside of a render.
	pub fn evaluate(&self, source: &str, context: &RenderContext) -> JinjacResult<Value> {
		let expr = parse_expression(source)?;
		self.eval(&expr, context, &mut Detached::default())
	}

	/// Parse and evaluate `source`, returning its truthiness.
	pub fn evaluate_condition(&self, source: &str, context: &RenderContext) -> JinjacResult<bool> {
		Ok(self.evaluate(source, context)?.is_truthy())
	}

	pub fn eval(
		&self,
		expr: &Expr,
		context: &RenderContext,
		hooks: &mut dyn RenderHooks,
	) -> JinjacResult<Value> {
		match expr {
			Expr::Literal(value) => Ok(value.clone()),
			Expr::Name(name) => Ok(context.get(name).cloned().unwrap_or_default()),
			Expr::List(items) => {
				items.iter()
					.map(|item| self.eval(item, context, hooks))
					.collect::<JinjacResult<Vec<_>>>()
					.map(Value::List)
			}
			Expr::Dict(entries) => {
				let mut map = ValueMap::new();
				for (key, value) in entries {
					let key = self.eval(key, context, hooks)?.to_string();
					map.insert(key, self.eval(value, context, hooks)?);
				}
				Ok(Value::Map(map))
			}
			Expr::Attribute { target, name } => {
				Ok(self.eval(target, context, hooks)?.get_attr(name))
			}
			Expr::Index { target, index } => {
				let target = self.eval(target, context, hooks)?;
				let index = self.eval(index, context, hooks)?;
				Ok(target.get_item(&index))
			}
			Expr::Call {
				target,
				args,
				kwargs,
			} => self.eval_call(target, args, kwargs, context, hooks),
			Expr::Filter { target, filter } => {
				let value = self.eval(target, context, hooks)?;
				self.apply_filter(filter, &value, context, hooks)
			}
			Expr::Test {
				target,
				name,
				args,
				negated,
			} => {
				let value = self.eval(target, context, hooks)?;
				let args = args
					.iter()
					.map(|arg| self.eval(arg, context, hooks))
					.collect::<JinjacResult<Vec<_>>>()?;
				let passed = run_test(name, &value, &args).unwrap_or_else(|| {
					debug!(test = %name, "unknown test evaluates to false");
					false
				});
				Ok(Value::Bool(passed != *negated))
			}
			Expr::Unary { op, operand } => {
				let value = self.eval(operand, context, hooks)?;
				self.unary(*op, &value)
			}
			Expr::Binary { op, left, right } => {
				let left = self.eval(left, context, hooks)?;
				match op {
					BinaryOp::Or if left.is_truthy() => Ok(left),
					BinaryOp::And if !left.is_truthy() => Ok(left),
					BinaryOp::Or | BinaryOp::And => self.eval(right, context, hooks),
					op => {
						let right = self.eval(right, context, hooks)?;
						self.binary(*op, &left, &right)
					}
				}
			}
			Expr::Conditional {
				condition,
				then,
				otherwise,
			} => {
				if self.eval(condition, context, hooks)?.is_truthy() {
					self.eval(then, context, hooks)
				} else {
					match otherwise {
						Some(otherwise) => self.eval(otherwise, context, hooks),
						None => Ok(Value::Undefined),
					}
				}
			}
			Expr::Super => hooks.render_super(context, self.position),
		}
	}

	/// Evaluate the arguments of a filter and apply it to `value`.
	pub fn apply_filter(
		&self,
		filter: &FilterCall,
		value: &Value,
		context: &RenderContext,
		hooks: &mut dyn RenderHooks,
	) -> JinjacResult<Value> {
		let (positional, named) = self.eval_args(&filter.args, &filter.kwargs, context, hooks)?;
		self.filters
			.apply(&filter.name, value, &FilterArgs::new(positional, named))
			.map_err(|error| error.located(&self.template, filter.position))
	}

	/// Evaluate positional and keyword arguments of a call.
	pub fn eval_args(
		&self,
		args: &[Expr],
		kwargs: &[(String, Expr)],
		context: &RenderContext,
		hooks: &mut dyn RenderHooks,
	) -> JinjacResult<(Vec<Value>, ValueMap)> {
		let positional = args
			.iter()
			.map(|arg| self.eval(arg, context, hooks))
			.collect::<JinjacResult<Vec<_>>>()?;

		let mut named = ValueMap::new();
		for (name, expr) in kwargs {
			named.insert(name.clone(), self.eval(expr, context, hooks)?);
		}

		Ok((positional, named))
	}

	fn eval_call(
		&self,
		target: &Expr,
		args: &[Expr],
		kwargs: &[(String, Expr)],
		context: &RenderContext,
		hooks: &mut dyn RenderHooks,
	) -> JinjacResult<Value> {
		match target {
			Expr::Name(name) if name.eq_ignore_ascii_case("loop") && context.contains("loop") => {
				let (positional, _) = self.eval_args(args, kwargs, context, hooks)?;
				let items = positional.into_iter().next().unwrap_or_default();
				return hooks.recurse_loop(items, context, self.position);
			}
			Expr::Name(name) if !context.contains(name) => {
				let (positional, named) = self.eval_args(args, kwargs, context, hooks)?;
				return self.call_builtin(name, positional, named, hooks);
			}
			Expr::Attribute { target, name } => {
				let object = self.eval(target, context, hooks)?;
				let (positional, named) = self.eval_args(args, kwargs, context, hooks)?;
				if let Some(result) = self.call_method(&object, name, &positional, &named)? {
					return Ok(result);
				}
				let callee = object.get_attr(name);
				return self.call_value(&callee, name, positional, named, context, hooks);
			}
			_ => {}
		}

		let callee = self.eval(target, context, hooks)?;
		let (positional, named) = self.eval_args(args, kwargs, context, hooks)?;
		let name = target.dotted_name().unwrap_or_else(|| callee.type_name().to_string());
		self.call_value(&callee, &name, positional, named, context, hooks)
	}

	/// Call a macro or helper object.
	pub fn call_value(
		&self,
		callee: &Value,
		name: &str,
		args: Vec<Value>,
		kwargs: ValueMap,
		context: &RenderContext,
		hooks: &mut dyn RenderHooks,
	) -> JinjacResult<Value> {
		match callee {
			Value::Macro(reference) => hooks.call_macro(reference, args, kwargs, None, context),
			Value::Joiner(joiner) => Ok(Value::String(joiner.call())),
			Value::Undefined => Err(self.error(format!("'{name}' is undefined and cannot be called"))),
			other => Err(self.error(format!("'{name}' is not callable ({})", other.type_name()))),
		}
	}

	fn call_builtin(
		&self,
		name: &str,
		args: Vec<Value>,
		kwargs: ValueMap,
		hooks: &mut dyn RenderHooks,
	) -> JinjacResult<Value> {
		let call = FilterArgs::new(args, kwargs);

		match name.to_ascii_lowercase().as_str() {
			"range" => self.range(&call.positional),
			"dict" => Ok(Value::Map(call.named)),
			"lipsum" => Ok(lipsum(&call)),
			"cycler" => Ok(Value::Cycler(Arc::new(Cycler::new(call.positional)))),
			"joiner" => {
				let separator = call.get(0, "sep").map_or_else(|| ", ".to_string(), ToString::to_string);
				Ok(Value::Joiner(Arc::new(Joiner::new(separator))))
			}
			"namespace" => {
				let mut attrs = match call.positional.into_iter().next() {
					Some(Value::Map(map)) => map,
					_ => ValueMap::new(),
				};
				attrs.extend(call.named);
				Ok(Value::Namespace(Arc::new(Namespace::new(attrs))))
			}
			"url_for" => {
				let endpoint = call.positional.first().map(ToString::to_string).unwrap_or_default();
				if endpoint != "static" {
					return Err(self.error(format!("url_for only supports the 'static' endpoint, got '{endpoint}'")));
				}
				let filename = call.get(1, "filename").map(ToString::to_string).unwrap_or_default();
				hooks.record_asset(&filename);
				Ok(Value::String(format!(
					"{}/{}",
					self.static_prefix.trim_end_matches('/'),
					filename.trim_start_matches('/')
				)))
			}
			_ => Err(self.error(format!("'{name}' is undefined and cannot be called"))),
		}
	}

	fn range(&self, args: &[Value]) -> JinjacResult<Value> {
		let numbers: Vec<i64> = args.iter().map(|arg| arg.as_i64().unwrap_or(0)).collect();
		let (start, stop, step) = match numbers.as_slice() {
			[stop] => (0, *stop, 1),
			[start, stop] => (*start, *stop, 1),
			[start, stop, step, ..] => (*start, *stop, if *step == 0 { 1 } else { *step }),
			[] => return Err(self.error("range expected at least 1 argument")),
		};

		// Widened so that bounds near the ends of i64 cannot overflow.
		let (start, stop, step) = (i128::from(start), i128::from(stop), i128::from(step));
		let count = if step > 0 {
			(stop - start + step - 1).div_euclid(step)
		} else {
			(start - stop - step - 1).div_euclid(-step)
		}
		.max(0);
		if count > i128::from(MAX_RANGE) {
			return Err(self.error(format!("range of {count} items exceeds the limit of {MAX_RANGE}")));
		}

		let items = (0..count)
			.filter_map(|index| i64::try_from(start + index * step).ok())
			.map(Value::Int)
			.collect();
		Ok(Value::List(items))
	}

	/// Methods on dictionaries, strings and helper objects. `None` when `name`
	/// is not a method of `object`.
	fn call_method(
		&self,
		object: &Value,
		name: &str,
		args: &[Value],
		kwargs: &ValueMap,
	) -> JinjacResult<Option<Value>> {
		let call = FilterArgs::new(args.to_vec(), kwargs.clone());
		let method = name.to_ascii_lowercase();

		let result = match (object, method.as_str()) {
			(Value::Map(map), "items") => {
				Value::List(
					map.iter()
						.map(|(key, value)| Value::List(vec![Value::String(key.clone()), value.clone()]))
						.collect(),
				)
			}
			(Value::Map(map), "cycle") if map.contains_key("index0") => {
				let index = map.get("index0").and_then(Value::as_i64).unwrap_or(0) as usize;
				if args.is_empty() {
					Value::Undefined
				} else {
					args[index % args.len()].clone()
				}
			}
			(Value::Map(map), "keys") => Value::List(map.keys().cloned().map(Value::String).collect()),
			(Value::Map(map), "values") => Value::List(map.values().cloned().collect()),
			(Value::Map(_), "get") => {
				let key = call.get(0, "key").cloned().unwrap_or_default();
				match object.get_item(&key) {
					Value::Undefined => call.get(1, "default").cloned().unwrap_or(Value::Null),
					found => found,
				}
			}
			(Value::String(text) | Value::Safe(text), method) => {
				match string_method(text, method, &call) {
					Some(result) => result,
					None => return Ok(None),
				}
			}
			(Value::Cycler(cycler), "next") => cycler.next_item(),
			(Value::Cycler(cycler), "reset") => {
				cycler.reset();
				Value::Undefined
			}
			(Value::Joiner(joiner), "call") => Value::String(joiner.call()),
			_ => return Ok(None),
		};

		Ok(Some(result))
	}

	fn unary(&self, op: UnaryOp, value: &Value) -> JinjacResult<Value> {
		match (op, value) {
			(UnaryOp::Not, value) => Ok(Value::Bool(!value.is_truthy())),
			(UnaryOp::Neg, Value::Int(number)) => {
				Ok(number
					.checked_neg()
					.map_or_else(|| Value::Float(-(*number as f64)), Value::Int))
			}
			(UnaryOp::Neg, Value::Float(number)) => Ok(Value::Float(-number)),
			(UnaryOp::Pos, value) if value.is_number() => Ok(value.clone()),
			(op, value) => {
				let symbol = if op == UnaryOp::Neg { "-" } else { "+" };
				Err(self.error(format!(
					"bad operand type for unary {symbol}: '{}'",
					value.type_name()
				)))
			}
		}
	}

	fn binary(&self, op: BinaryOp, left: &Value, right: &Value) -> JinjacResult<Value> {
		let result = match op {
			BinaryOp::Eq => Value::Bool(left.loose_eq(right)),
			BinaryOp::Ne => Value::Bool(!left.loose_eq(right)),
			BinaryOp::Lt | BinaryOp::Le | BinaryOp::Gt | BinaryOp::Ge => {
				let ordering = left
					.compare(right)
					.unwrap_or_else(|| left.to_string().cmp(&right.to_string()));
				Value::Bool(match op {
					BinaryOp::Lt => ordering == Ordering::Less,
					BinaryOp::Le => ordering != Ordering::Greater,
					BinaryOp::Gt => ordering == Ordering::Greater,
					_ => ordering != Ordering::Less,
				})
			}
			BinaryOp::In => Value::Bool(right.contains(left)),
			BinaryOp::NotIn => Value::Bool(!right.contains(left)),
			BinaryOp::Concat => Value::String(format!("{left}{right}")),
			BinaryOp::Add => {
				match (left, right) {
					(Value::List(left), Value::List(right)) => {
						Value::List(left.iter().chain(right).cloned().collect())
					}
					(left, right) if left.is_string() || right.is_string() => {
						Value::String(format!("{left}{right}"))
					}
					_ => self.arithmetic(op, left, right)?,
				}
			}
			BinaryOp::Mul => {
				match (left, right) {
					(Value::String(text) | Value::Safe(text), Value::Int(count))
					| (Value::Int(count), Value::String(text) | Value::Safe(text)) => {
						let count = repeat_count(*count).map_err(|reason| self.error(reason))?;
						Value::String(text.repeat(count))
					}
					_ => self.arithmetic(op, left, right)?,
				}
			}
			BinaryOp::Mod if left.is_string() => {
				let args = match right {
					Value::List(items) => FilterArgs::positional(items.clone()),
					Value::Map(map) => FilterArgs::new(vec![], map.clone()),
					other => FilterArgs::positional(vec![other.clone()]),
				};
				Value::String(printf(&left.to_string(), &args).map_err(|reason| self.error(reason))?)
			}
			BinaryOp::Sub | BinaryOp::Div | BinaryOp::FloorDiv | BinaryOp::Mod | BinaryOp::Pow => {
				self.arithmetic(op, left, right)?
			}
			BinaryOp::Or | BinaryOp::And => Value::Bool(left.is_truthy() || right.is_truthy()),
		};

		Ok(result)
	}

	/// Numeric operators. Integer operands stay integers except for `/`;
	/// overflow falls back to floats and division by zero yields `0`.
	fn arithmetic(&self, op: BinaryOp, left: &Value, right: &Value) -> JinjacResult<Value> {
		if let (Value::Int(left), Value::Int(right)) = (left, right) {
			let (left, right) = (*left, *right);
			let integer = match op {
				BinaryOp::Add => left.checked_add(right),
				BinaryOp::Sub => left.checked_sub(right),
				BinaryOp::Mul => left.checked_mul(right),
				BinaryOp::FloorDiv if right == 0 => Some(0),
				BinaryOp::FloorDiv => floor_div(left, right),
				BinaryOp::Mod if right == 0 => Some(0),
				BinaryOp::Mod => floor_mod(left, right),
				BinaryOp::Pow if right >= 0 => {
					u32::try_from(right)
						.ok()
						.and_then(|exponent| left.checked_pow(exponent))
				}
				BinaryOp::Div if right == 0 => return Ok(Value::Int(0)),
				_ => None,
			};
			if let Some(integer) = integer {
				return Ok(Value::Int(integer));
			}
		}

		let (Some(left_number), Some(right_number)) = (left.as_f64(), right.as_f64()) else {
			let symbol = match op {
				BinaryOp::Add => "+",
				BinaryOp::Sub => "-",
				BinaryOp::Mul => "*",
				BinaryOp::Div => "/",
				BinaryOp::FloorDiv => "//",
				BinaryOp::Mod => "%",
				_ => "**",
			};
			return Err(self.error(format!(
				"unsupported operand types for {symbol}: '{}' and '{}'",
				left.type_name(),
				right.type_name()
			)));
		};

		let number = match op {
			BinaryOp::Add => left_number + right_number,
			BinaryOp::Sub => left_number - right_number,
			BinaryOp::Mul => left_number * right_number,
			BinaryOp::Div | BinaryOp::FloorDiv | BinaryOp::Mod if right_number == 0.0 => {
				return Ok(Value::Int(0));
			}
			BinaryOp::Div => left_number / right_number,
			BinaryOp::FloorDiv => (left_number / right_number).floor(),
			BinaryOp::Mod => left_number - right_number * (left_number / right_number).floor(),
			_ => left_number.powf(right_number),
		};

		Ok(Value::Float(number))
	}
}

/// Integer division rounding towards negative infinity.
fn floor_div(left: i64, right: i64) -> Option<i64> {
	let quotient = left.checked_div(right)?;
	let remainder = left.checked_rem(right)?;
	if remainder != 0 && (remainder < 0) != (right < 0) {
		Some(quotient - 1)
	} else {
		Some(quotient)
	}
}

/// Remainder taking the sign of the divisor.
fn floor_mod(left: i64, right: i64) -> Option<i64> {
	let remainder = left.checked_rem(right)?;
	if remainder != 0 && (remainder < 0) != (right < 0) {
		Some(remainder + right)
	} else {
		Some(remainder)
	}
}

fn string_method(text: &str, method: &str, call: &FilterArgs) -> Option<Value> {
	let arg = |index: usize, name: &str| call.get(index, name).map(ToString::to_string);

	let result = match method {
		"upper" => Value::String(text.to_uppercase()),
		"lower" => Value::String(text.to_lowercase()),
		"strip" => {
			match arg(0, "chars") {
				Some(chars) => Value::String(text.trim_matches(|ch: char| chars.contains(ch)).to_string()),
				None => Value::String(text.trim().to_string()),
			}
		}
		"lstrip" => Value::String(text.trim_start().to_string()),
		"rstrip" => Value::String(text.trim_end().to_string()),
		"title" => Value::String(title_case(text)),
		"capitalize" => Value::String(capitalize_word(text)),
		"startswith" => Value::Bool(arg(0, "prefix").is_some_and(|prefix| text.starts_with(&prefix))),
		"endswith" => Value::Bool(arg(0, "suffix").is_some_and(|suffix| text.ends_with(&suffix))),
		"split" => {
			let parts: Vec<Value> = match arg(0, "sep").filter(|sep| !sep.is_empty()) {
				Some(separator) => text.split(separator.as_str()).map(Value::from).collect(),
				None => text.split_whitespace().map(Value::from).collect(),
			};
			Value::List(parts)
		}
		"replace" => {
			let (Some(old), Some(new)) = (arg(0, "old"), arg(1, "new")) else {
				return Some(Value::String(text.to_string()));
			};
			if old.is_empty() {
				Value::String(text.to_string())
			} else {
				Value::String(text.replace(&old, &new))
			}
		}
		_ => return None,
	};

	Some(result)
}

/// Deterministic placeholder text: `n` paragraphs of lorem ipsum.
fn lipsum(call: &FilterArgs) -> Value {
	let paragraphs = call
		.get(0, "n")
		.and_then(Value::as_i64)
		.unwrap_or(5)
		.clamp(0, 100) as usize;
	let html = call.get(1, "html").is_none_or(Value::is_truthy);
	let min = call.get(2, "min").and_then(Value::as_i64).unwrap_or(20).clamp(1, 1000) as usize;
	let max = call.get(3, "max").and_then(Value::as_i64).unwrap_or(100).clamp(1, 1000) as usize;
	let max = max.max(min);

	let mut offset = 0;
	let text = (0..paragraphs)
		.map(|index| {
			let length = min + (index * 17) % (max - min + 1);
			let words: Vec<&str> = (0..length)
				.map(|word| LIPSUM_WORDS[(offset + word) % LIPSUM_WORDS.len()])
				.collect();
			offset += length;
			let mut paragraph = capitalize_word(&words.join(" "));
			paragraph.push('.');
			if html {
				format!("<p>{paragraph}</p>")
			} else {
				paragraph
			}
		})
		.collect::<Vec<_>>()
		.join("\n\n");

	if html { Value::safe(text) } else { Value::String(text) }
}
