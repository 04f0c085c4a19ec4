use std::cmp::Ordering;
use std::fmt::Display;
use std::fmt::Write;
use std::sync::Arc;
use std::sync::PoisonError;
use std::sync::RwLock;
use std::sync::atomic::AtomicBool;
use std::sync::atomic::AtomicUsize;
use std::sync::atomic::Ordering as AtomicOrdering;

use float_cmp::approx_eq;
use indexmap::IndexMap;
use serde::Serialize;
use serde::Serializer;
use serde::ser::SerializeMap;
use serde::ser::SerializeSeq;

use crate::RenderContext;
use crate::ast::MacroDef;

/// Ordered string-keyed map used for template dictionaries.
pub type ValueMap = IndexMap<String, Value>;

/// The macros defined by one template, by name.
pub type MacroModule = IndexMap<String, Arc<MacroDef>>;

/// A dynamically typed template value.
#[derive(Debug, Clone, Default)]
pub enum Value {
	/// The absent value produced by unknown names and missing attributes.
	#[default]
	Undefined,
	Null,
	Bool(bool),
	Int(i64),
	Float(f64),
	String(String),
	/// A string exempt from auto-escaping.
	Safe(String),
	List(Vec<Value>),
	Map(ValueMap),
	Macro(Arc<MacroRef>),
	Cycler(Arc<Cycler>),
	Joiner(Arc<Joiner>),
	Namespace(Arc<Namespace>),
}

/// A callable macro together with the environment it was defined in.
#[derive(Debug)]
pub struct MacroRef {
	pub def: Arc<MacroDef>,
	/// Every macro of the defining template, visible from inside the body.
	pub module: Arc<MacroModule>,
	/// The template the macro was defined in.
	pub template: String,
	/// Variables captured at definition time. Only `caller` bodies close over
	/// the calling context.
	pub closure: Option<Arc<RenderContext>>,
}

/// State behind `cycler(...)`.
#[derive(Debug)]
pub struct Cycler {
	items: Vec<Value>,
	index: AtomicUsize,
}

impl Cycler {
	pub fn new(items: Vec<Value>) -> Self {
		Self {
			items,
			index: AtomicUsize::new(0),
		}
	}

	/// The item the cycler currently points at.
	pub fn current(&self) -> Value {
		if self.items.is_empty() {
			return Value::Undefined;
		}

		let index = self.index.load(AtomicOrdering::Relaxed);
		self.items[index % self.items.len()].clone()
	}

	/// Return the current item and move to the next one.
	pub fn next_item(&self) -> Value {
		let value = self.current();
		self.index.fetch_add(1, AtomicOrdering::Relaxed);
		value
	}

	pub fn reset(&self) {
		self.index.store(0, AtomicOrdering::Relaxed);
	}
}

/// State behind `joiner(sep)`.
#[derive(Debug)]
pub struct Joiner {
	separator: String,
	used: AtomicBool,
}

impl Joiner {
	pub fn new(separator: impl Into<String>) -> Self {
		Self {
			separator: separator.into(),
			used: AtomicBool::new(false),
		}
	}

	/// Empty on the first call, the separator afterwards.
	pub fn call(&self) -> String {
		if self.used.swap(true, AtomicOrdering::Relaxed) {
			self.separator.clone()
		} else {
			String::new()
		}
	}
}

/// State behind `namespace()`: the only value templates can mutate in place.
#[derive(Debug, Default)]
pub struct Namespace {
	attrs: RwLock<ValueMap>,
}

impl Namespace {
	pub fn new(attrs: ValueMap) -> Self {
		Self {
			attrs: RwLock::new(attrs),
		}
	}

	pub fn get(&self, name: &str) -> Value {
		let attrs = self.attrs.read().unwrap_or_else(PoisonError::into_inner);
		lookup_key(&attrs, name).cloned().unwrap_or_default()
	}

	pub fn set(&self, name: &str, value: Value) {
		let mut attrs = self.attrs.write().unwrap_or_else(PoisonError::into_inner);
		attrs.insert(name.to_string(), value);
	}

	pub fn snapshot(&self) -> ValueMap {
		self.attrs
			.read()
			.unwrap_or_else(PoisonError::into_inner)
			.clone()
	}
}

/// Look up `key` in `map`, falling back to a case-insensitive match.
pub fn lookup_key<'m>(map: &'m ValueMap, key: &str) -> Option<&'m Value> {
	map.get(key).or_else(|| {
		map.iter()
			.find(|(candidate, _)| candidate.eq_ignore_ascii_case(key))
			.map(|(_, value)| value)
	})
}

impl Value {
	pub fn safe(text: impl Into<String>) -> Self {
		Self::Safe(text.into())
	}

	pub fn is_undefined(&self) -> bool {
		matches!(self, Value::Undefined)
	}

	/// True for both `none` and undefined values.
	pub fn is_none(&self) -> bool {
		matches!(self, Value::Undefined | Value::Null)
	}

	pub fn is_safe(&self) -> bool {
		matches!(self, Value::Safe(_))
	}

	pub fn is_number(&self) -> bool {
		matches!(self, Value::Int(_) | Value::Float(_))
	}

	pub fn is_string(&self) -> bool {
		matches!(self, Value::String(_) | Value::Safe(_))
	}

	pub fn is_callable(&self) -> bool {
		matches!(self, Value::Macro(_) | Value::Joiner(_))
	}

	pub fn type_name(&self) -> &'static str {
		match self {
			Value::Undefined => "undefined",
			Value::Null => "none",
			Value::Bool(_) => "bool",
			Value::Int(_) => "integer",
			Value::Float(_) => "float",
			Value::String(_) | Value::Safe(_) => "string",
			Value::List(_) => "list",
			Value::Map(_) => "dict",
			Value::Macro(_) => "macro",
			Value::Cycler(_) => "cycler",
			Value::Joiner(_) => "joiner",
			Value::Namespace(_) => "namespace",
		}
	}

	/// Template truthiness: none, false, zero and empty strings or collections
	/// are false.
	pub fn is_truthy(&self) -> bool {
		match self {
			Value::Undefined | Value::Null => false,
			Value::Bool(value) => *value,
			Value::Int(value) => *value != 0,
			Value::Float(value) => *value != 0.0,
			Value::String(value) | Value::Safe(value) => !value.is_empty(),
			Value::List(items) => !items.is_empty(),
			Value::Map(map) => !map.is_empty(),
			Value::Macro(_) | Value::Cycler(_) | Value::Joiner(_) | Value::Namespace(_) => true,
		}
	}

	pub fn as_str(&self) -> Option<&str> {
		match self {
			Value::String(value) | Value::Safe(value) => Some(value),
			_ => None,
		}
	}

	pub fn as_f64(&self) -> Option<f64> {
		match self {
			Value::Int(value) => Some(*value as f64),
			Value::Float(value) => Some(*value),
			Value::Bool(value) => Some(f64::from(u8::from(*value))),
			_ => None,
		}
	}

	pub fn as_i64(&self) -> Option<i64> {
		match self {
			Value::Int(value) => Some(*value),
			Value::Float(value) => Some(value.trunc() as i64),
			Value::Bool(value) => Some(i64::from(*value)),
			_ => None,
		}
	}

	/// Numeric view used by filters: numbers as-is, numeric strings parsed.
	pub fn to_f64_lossy(&self) -> Option<f64> {
		self.as_f64()
			.or_else(|| self.as_str().and_then(|text| text.trim().parse().ok()))
	}

	pub fn len(&self) -> Option<usize> {
		match self {
			Value::String(value) | Value::Safe(value) => Some(value.chars().count()),
			Value::List(items) => Some(items.len()),
			Value::Map(map) => Some(map.len()),
			Value::Namespace(namespace) => Some(namespace.snapshot().len()),
			_ => None,
		}
	}

	pub fn is_empty(&self) -> bool {
		self.len().is_none_or(|len| len == 0)
	}

	/// Items of a collection as a list: list items, map keys or string
	/// characters.
	pub fn to_items(&self) -> Option<Vec<Value>> {
		match self {
			Value::List(items) => Some(items.clone()),
			Value::Map(map) => Some(map.keys().cloned().map(Value::String).collect()),
			Value::String(value) | Value::Safe(value) => {
				Some(value.chars().map(|ch| Value::String(ch.to_string())).collect())
			}
			_ => None,
		}
	}

	/// Attribute access: map keys (case-insensitive fallback), numeric list
	/// positions and helper object fields.
	pub fn get_attr(&self, name: &str) -> Value {
		match self {
			Value::Map(map) => lookup_key(map, name).cloned().unwrap_or_default(),
			Value::List(_) | Value::String(_) | Value::Safe(_) => {
				match name.parse::<i64>() {
					Ok(index) => self.get_item(&Value::Int(index)),
					Err(_) => Value::Undefined,
				}
			}
			Value::Namespace(namespace) => namespace.get(name),
			Value::Cycler(cycler) if name.eq_ignore_ascii_case("current") => cycler.current(),
			_ => Value::Undefined,
		}
	}

	/// Subscript access. Negative list indexes count from the end.
	pub fn get_item(&self, key: &Value) -> Value {
		match (self, key) {
			(Value::List(items), key) => {
				key.as_i64()
					.and_then(|index| resolve_index(index, items.len()))
					.and_then(|index| items.get(index).cloned())
					.unwrap_or_default()
			}
			(Value::String(text) | Value::Safe(text), key) => {
				let chars: Vec<char> = text.chars().collect();
				key.as_i64()
					.and_then(|index| resolve_index(index, chars.len()))
					.map(|index| Value::String(chars[index].to_string()))
					.unwrap_or_default()
			}
			(Value::Map(_) | Value::Namespace(_), key) => {
				match key {
					Value::String(name) | Value::Safe(name) => self.get_attr(name),
					Value::Undefined | Value::Null => Value::Undefined,
					other => self.get_attr(&other.to_string()),
				}
			}
			_ => Value::Undefined,
		}
	}

	/// Template equality: numbers compare as floats, scalars of different
	/// kinds compare by their rendered text.
	pub fn loose_eq(&self, other: &Value) -> bool {
		match (self, other) {
			(Value::Undefined | Value::Null, Value::Undefined | Value::Null) => true,
			(Value::Undefined | Value::Null, _) | (_, Value::Undefined | Value::Null) => false,
			(left, right) if left.is_number() && right.is_number() => {
				let (Some(left), Some(right)) = (left.as_f64(), right.as_f64()) else {
					return false;
				};
				approx_eq!(f64, left, right, ulps = 2)
			}
			(Value::Bool(left), Value::Bool(right)) => left == right,
			(Value::List(left), Value::List(right)) => {
				left.len() == right.len()
					&& left
						.iter()
						.zip(right)
						.all(|(left, right)| left.loose_eq(right))
			}
			(Value::Map(left), Value::Map(right)) => {
				left.len() == right.len()
					&& left.iter().all(|(key, value)| {
						right
							.get(key)
							.is_some_and(|other| value.loose_eq(other))
					})
			}
			(Value::Macro(left), Value::Macro(right)) => Arc::ptr_eq(left, right),
			(Value::Cycler(left), Value::Cycler(right)) => Arc::ptr_eq(left, right),
			(Value::Joiner(left), Value::Joiner(right)) => Arc::ptr_eq(left, right),
			(Value::Namespace(left), Value::Namespace(right)) => Arc::ptr_eq(left, right),
			(left, right) if left.is_scalar() && right.is_scalar() => {
				left.to_string() == right.to_string()
			}
			_ => false,
		}
	}

	fn is_scalar(&self) -> bool {
		matches!(
			self,
			Value::Bool(_) | Value::Int(_) | Value::Float(_) | Value::String(_) | Value::Safe(_)
		)
	}

	/// Ordering used by comparisons and sorting: none sorts lowest, numbers
	/// numerically, strings ordinally.
	pub fn compare(&self, other: &Value) -> Option<Ordering> {
		match (self, other) {
			(Value::Undefined | Value::Null, Value::Undefined | Value::Null) => {
				Some(Ordering::Equal)
			}
			(Value::Undefined | Value::Null, _) => Some(Ordering::Less),
			(_, Value::Undefined | Value::Null) => Some(Ordering::Greater),
			(left, right) if left.is_number() && right.is_number() => {
				left.as_f64()?.partial_cmp(&right.as_f64()?)
			}
			(Value::Bool(left), Value::Bool(right)) => Some(left.cmp(right)),
			(left, right) if left.is_string() && right.is_string() => {
				Some(left.as_str()?.cmp(right.as_str()?))
			}
			(Value::List(left), Value::List(right)) => {
				for (left, right) in left.iter().zip(right) {
					match left.compare(right)? {
						Ordering::Equal => {}
						ordering => return Some(ordering),
					}
				}
				Some(left.len().cmp(&right.len()))
			}
			_ => None,
		}
	}

	/// Membership: substring for strings, item for lists, key for maps.
	pub fn contains(&self, needle: &Value) -> bool {
		match self {
			Value::String(haystack) | Value::Safe(haystack) => {
				needle
					.as_str()
					.map_or_else(|| haystack.contains(&needle.to_string()), |needle| {
						haystack.contains(needle)
					})
			}
			Value::List(items) => items.iter().any(|item| item.loose_eq(needle)),
			Value::Map(map) => {
				needle
					.as_str()
					.is_some_and(|key| lookup_key(map, key).is_some())
			}
			Value::Namespace(namespace) => {
				needle
					.as_str()
					.is_some_and(|key| !namespace.get(key).is_undefined())
			}
			_ => false,
		}
	}

	/// Python-style representation used when collections are printed.
	pub fn repr(&self) -> String {
		match self {
			Value::String(text) | Value::Safe(text) => {
				format!("'{}'", text.replace('\\', "\\\\").replace('\'', "\\'"))
			}
			Value::Undefined | Value::Null => "None".to_string(),
			other => other.to_string(),
		}
	}

	/// Convert to JSON. Helper objects become their display text.
	pub fn to_json(&self) -> serde_json::Value {
		match self {
			Value::Undefined | Value::Null => serde_json::Value::Null,
			Value::Bool(value) => serde_json::Value::Bool(*value),
			Value::Int(value) => serde_json::Value::from(*value),
			Value::Float(value) => {
				serde_json::Number::from_f64(*value)
					.map_or(serde_json::Value::Null, serde_json::Value::Number)
			}
			Value::String(value) | Value::Safe(value) => serde_json::Value::String(value.clone()),
			Value::List(items) => serde_json::Value::Array(items.iter().map(Value::to_json).collect()),
			Value::Map(map) => {
				serde_json::Value::Object(
					map.iter()
						.map(|(key, value)| (key.clone(), value.to_json()))
						.collect(),
				)
			}
			Value::Namespace(namespace) => Value::Map(namespace.snapshot()).to_json(),
			Value::Macro(_) | Value::Cycler(_) | Value::Joiner(_) => {
				serde_json::Value::String(self.to_string())
			}
		}
	}
}

fn resolve_index(index: i64, len: usize) -> Option<usize> {
	let len = len as i64;
	let index = if index < 0 { len + index } else { index };
	(0..len).contains(&index).then_some(index as usize)
}

/// Format a float the way templates print numbers: integral floats drop the
/// fraction.
pub fn format_float(value: f64) -> String {
	if value.is_finite() && value.fract() == 0.0 && value.abs() < 1e16 {
		format!("{}", value as i64)
	} else {
		format!("{value}")
	}
}

impl Display for Value {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		match self {
			Value::Undefined | Value::Null => Ok(()),
			Value::Bool(true) => write!(f, "True"),
			Value::Bool(false) => write!(f, "False"),
			Value::Int(value) => write!(f, "{value}"),
			Value::Float(value) => write!(f, "{}", format_float(*value)),
			Value::String(value) | Value::Safe(value) => write!(f, "{value}"),
			Value::List(items) => {
				f.write_char('[')?;
				for (index, item) in items.iter().enumerate() {
					if index > 0 {
						f.write_str(", ")?;
					}
					f.write_str(&item.repr())?;
				}
				f.write_char(']')
			}
			Value::Map(map) => write_map(f, map),
			Value::Namespace(namespace) => write_map(f, &namespace.snapshot()),
			Value::Macro(reference) => write!(f, "<macro {}>", reference.def.name),
			Value::Cycler(_) => write!(f, "<cycler>"),
			Value::Joiner(_) => write!(f, "<joiner>"),
		}
	}
}

fn write_map(f: &mut std::fmt::Formatter<'_>, map: &ValueMap) -> std::fmt::Result {
	f.write_char('{')?;
	for (index, (key, value)) in map.iter().enumerate() {
		if index > 0 {
			f.write_str(", ")?;
		}
		write!(f, "'{key}': {}", value.repr())?;
	}
	f.write_char('}')
}

impl PartialEq for Value {
	fn eq(&self, other: &Self) -> bool {
		match (self, other) {
			(Value::Undefined, Value::Undefined) | (Value::Null, Value::Null) => true,
			(Value::Bool(left), Value::Bool(right)) => left == right,
			(Value::Int(left), Value::Int(right)) => left == right,
			(Value::Float(left), Value::Float(right)) => approx_eq!(f64, *left, *right, ulps = 2),
			(Value::String(left), Value::String(right)) | (Value::Safe(left), Value::Safe(right)) => {
				left == right
			}
			(Value::List(left), Value::List(right)) => left == right,
			(Value::Map(left), Value::Map(right)) => left == right,
			(Value::Macro(left), Value::Macro(right)) => Arc::ptr_eq(left, right),
			(Value::Cycler(left), Value::Cycler(right)) => Arc::ptr_eq(left, right),
			(Value::Joiner(left), Value::Joiner(right)) => Arc::ptr_eq(left, right),
			(Value::Namespace(left), Value::Namespace(right)) => Arc::ptr_eq(left, right),
			_ => false,
		}
	}
}

impl Serialize for Value {
	fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
		match self {
			Value::Undefined | Value::Null => serializer.serialize_none(),
			Value::Bool(value) => serializer.serialize_bool(*value),
			Value::Int(value) => serializer.serialize_i64(*value),
			Value::Float(value) => serializer.serialize_f64(*value),
			Value::String(value) | Value::Safe(value) => serializer.serialize_str(value),
			Value::List(items) => {
				let mut seq = serializer.serialize_seq(Some(items.len()))?;
				for item in items {
					seq.serialize_element(item)?;
				}
				seq.end()
			}
			Value::Map(map) => {
				let mut state = serializer.serialize_map(Some(map.len()))?;
				for (key, value) in map {
					state.serialize_entry(key, value)?;
				}
				state.end()
			}
			Value::Namespace(namespace) => Value::Map(namespace.snapshot()).serialize(serializer),
			Value::Macro(_) | Value::Cycler(_) | Value::Joiner(_) => {
				serializer.serialize_str(&self.to_string())
			}
		}
	}
}

impl From<serde_json::Value> for Value {
	/// Integers that fit `i64` stay integers; every other number becomes a
	/// float.
	fn from(value: serde_json::Value) -> Self {
		match value {
			serde_json::Value::Null => Value::Null,
			serde_json::Value::Bool(value) => Value::Bool(value),
			serde_json::Value::Number(number) => {
				number.as_i64().map_or_else(
					|| Value::Float(number.as_f64().unwrap_or(f64::NAN)),
					Value::Int,
				)
			}
			serde_json::Value::String(value) => Value::String(value),
			serde_json::Value::Array(items) => Value::List(items.into_iter().map(Value::from).collect()),
			serde_json::Value::Object(map) => {
				Value::Map(
					map.into_iter()
						.map(|(key, value)| (key, Value::from(value)))
						.collect(),
				)
			}
		}
	}
}

impl From<bool> for Value {
	fn from(value: bool) -> Self {
		Value::Bool(value)
	}
}

impl From<i64> for Value {
	fn from(value: i64) -> Self {
		Value::Int(value)
	}
}

impl From<i32> for Value {
	fn from(value: i32) -> Self {
		Value::Int(i64::from(value))
	}
}

impl From<usize> for Value {
	fn from(value: usize) -> Self {
		Value::Int(value as i64)
	}
}

impl From<f64> for Value {
	fn from(value: f64) -> Self {
		Value::Float(value)
	}
}

impl From<&str> for Value {
	fn from(value: &str) -> Self {
		Value::String(value.to_string())
	}
}

impl From<String> for Value {
	fn from(value: String) -> Self {
		Value::String(value)
	}
}

impl From<Vec<Value>> for Value {
	fn from(value: Vec<Value>) -> Self {
		Value::List(value)
	}
}

impl From<ValueMap> for Value {
	fn from(value: ValueMap) -> Self {
		Value::Map(value)
	}
}

impl<T: Into<Value>> From<Option<T>> for Value {
	fn from(value: Option<T>) -> Self {
		value.map_or(Value::Null, Into::into)
	}
}
