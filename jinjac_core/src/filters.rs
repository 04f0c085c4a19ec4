use std::cmp::Ordering;
use std::collections::HashMap;
use std::collections::hash_map::RandomState;
use std::fmt;
use std::hash::BuildHasher;
use std::sync::Arc;

use tracing::debug;

use crate::JinjacError;
use crate::JinjacResult;
use crate::Value;
use crate::ValueMap;
use crate::testers::run_test;
use crate::value::format_float;
use crate::value::lookup_key;

/// A filter implementation. Errors are plain reasons; the registry wraps them
/// into [`JinjacError::FilterFailed`].
pub type FilterFn = Arc<dyn Fn(&Value, &FilterArgs) -> Result<Value, String> + Send + Sync>;

type BuiltinFilter = fn(&Value, &FilterArgs) -> Result<Value, String>;

/// Evaluated arguments of one filter application.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FilterArgs {
	pub positional: Vec<Value>,
	pub named: ValueMap,
}

impl FilterArgs {
	pub fn new(positional: Vec<Value>, named: ValueMap) -> Self {
		Self { positional, named }
	}

	pub fn positional(positional: Vec<Value>) -> Self {
		Self {
			positional,
			named: ValueMap::new(),
		}
	}

	/// The argument passed by keyword `name`, or else at position `index`.
	pub fn get(&self, index: usize, name: &str) -> Option<&Value> {
		lookup_key(&self.named, name).or_else(|| self.positional.get(index))
	}

	fn int(&self, index: usize, name: &str, default: i64) -> i64 {
		self.get(index, name)
			.and_then(Value::to_f64_lossy)
			.map_or(default, |number| number as i64)
	}

	fn flag(&self, index: usize, name: &str, default: bool) -> bool {
		self.get(index, name).map_or(default, Value::is_truthy)
	}

	fn text(&self, index: usize, name: &str, default: &str) -> String {
		self.get(index, name)
			.filter(|value| !value.is_none())
			.map_or_else(|| default.to_string(), ToString::to_string)
	}
}

/// Named filters applied with `value|name(args)`. Names are case-insensitive.
#[derive(Clone)]
pub struct FilterRegistry {
	filters: HashMap<String, FilterFn>,
}

impl fmt::Debug for FilterRegistry {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("FilterRegistry")
			.field("filters", &self.names())
			.finish()
	}
}

impl Default for FilterRegistry {
	fn default() -> Self {
		Self::new()
	}
}

impl FilterRegistry {
	/// A registry holding every built-in filter.
	pub fn new() -> Self {
		let mut registry = Self::empty();
		for (name, filter) in BUILTINS {
			registry.register(name, *filter);
		}
		registry
	}

	pub fn empty() -> Self {
		Self {
			filters: HashMap::new(),
		}
	}

	/// Register `filter` under `name`, replacing any existing filter.
	pub fn register<F>(&mut self, name: &str, filter: F)
	where
		F: Fn(&Value, &FilterArgs) -> Result<Value, String> + Send + Sync + 'static,
	{
		self.filters.insert(name.to_lowercase(), Arc::new(filter));
	}

	pub fn contains(&self, name: &str) -> bool {
		self.filters.contains_key(&name.to_lowercase())
	}

	/// Every registered name, sorted.
	pub fn names(&self) -> Vec<String> {
		let mut names: Vec<String> = self.filters.keys().cloned().collect();
		names.sort();
		names
	}

	/// Apply the filter `name`. Unknown filters return the value unchanged.
	pub fn apply(&self, name: &str, value: &Value, args: &FilterArgs) -> JinjacResult<Value> {
		let key = name.to_lowercase();

		if key == "map" {
			if let Some(mapped) = self.map_with_filter(value, args)? {
				return Ok(mapped);
			}
		}

		let Some(filter) = self.filters.get(&key) else {
			debug!(filter = %name, "unknown filter, passing value through");
			return Ok(value.clone());
		};

		filter(value, args).map_err(|reason| failed(name, reason))
	}

	/// `map("filter", args...)` applies another filter to every item.
	fn map_with_filter(&self, value: &Value, args: &FilterArgs) -> JinjacResult<Option<Value>> {
		if lookup_key(&args.named, "attribute").is_some() {
			return Ok(None);
		}

		let Some(filter) = args.positional.first().and_then(Value::as_str) else {
			return Ok(None);
		};
		if !self.contains(filter) || filter.eq_ignore_ascii_case("map") {
			return Ok(None);
		}

		let rest = FilterArgs::new(args.positional[1..].to_vec(), args.named.clone());
		let items = value.to_items().unwrap_or_default();
		let mapped = items
			.iter()
			.map(|item| self.apply(filter, item, &rest))
			.collect::<JinjacResult<Vec<_>>>()?;

		Ok(Some(Value::List(mapped)))
	}
}

fn failed(name: &str, reason: String) -> JinjacError {
	JinjacError::FilterFailed {
		name: name.to_string(),
		reason,
		template: String::new(),
		line: 0,
		column: 0,
	}
}

const BUILTINS: &[(&str, BuiltinFilter)] = &[
	("upper", upper),
	("lower", lower),
	("capitalize", capitalize),
	("title", title),
	("trim", trim),
	("striptags", striptags),
	("safe", safe),
	("escape", escape),
	("e", escape),
	("forceescape", forceescape),
	("urlencode", urlencode),
	("replace", replace),
	("truncate", truncate),
	("wordwrap", wordwrap),
	("center", center),
	("indent", indent),
	("abs", abs),
	("round", round),
	("int", int),
	("float", float),
	("string", string),
	("length", length),
	("count", length),
	("first", first),
	("last", last),
	("reverse", reverse),
	("sort", sort),
	("join", join),
	("unique", unique),
	("list", list),
	("batch", batch),
	("slice", slice),
	("map", map),
	("select", select),
	("reject", reject),
	("selectattr", selectattr),
	("rejectattr", rejectattr),
	("sum", sum),
	("max", max),
	("min", min),
	("attr", attr),
	("items", items),
	("keys", keys),
	("values", values),
	("dictsort", dictsort),
	("default", default),
	("d", default),
	("tojson", tojson),
	("pprint", pprint),
	("bool", boolean),
	("format", format),
	("filesizeformat", filesizeformat),
	("wordcount", wordcount),
	("xmlattr", xmlattr),
	("random", random),
	("groupby", groupby),
];

/// Escape the HTML special characters of `text`.
pub fn escape_html(text: &str) -> String {
	let mut escaped = String::with_capacity(text.len());
	for ch in text.chars() {
		match ch {
			'&' => escaped.push_str("&amp;"),
			'<' => escaped.push_str("&lt;"),
			'>' => escaped.push_str("&gt;"),
			'"' => escaped.push_str("&quot;"),
			'\'' => escaped.push_str("&#39;"),
			_ => escaped.push(ch),
		}
	}
	escaped
}

/// Apply a text transformation, keeping safe strings safe. None and undefined
/// pass through so the missing-variable policy still sees them.
/// Most copies a template may ask for, through `*`, padding, indentation or
/// batch filling.
const MAX_REPEAT: usize = 100_000;

/// Validate a user supplied repeat or size count. Negative counts are zero.
pub(crate) fn repeat_count(count: i64) -> Result<usize, String> {
	let count = usize::try_from(count.max(0)).map_err(|e| e.to_string())?;
	if count > MAX_REPEAT {
		return Err(format!("count of {count} exceeds the limit of {MAX_REPEAT}"));
	}
	Ok(count)
}

fn map_text(value: &Value, transform: impl Fn(&str) -> String) -> Result<Value, String> {
	Ok(match value {
		Value::Undefined | Value::Null => value.clone(),
		Value::Safe(text) => Value::Safe(transform(text)),
		other => Value::String(transform(&other.to_string())),
	})
}

/// Resolve a dotted attribute path such as `author.name` or `tags.0`.
fn attribute_path(value: &Value, path: &str) -> Value {
	path.split('.')
		.fold(value.clone(), |current, part| current.get_attr(part))
}

fn items_of(value: &Value) -> Vec<Value> {
	value.to_items().unwrap_or_default()
}

fn upper(value: &Value, _: &FilterArgs) -> Result<Value, String> {
	map_text(value, str::to_uppercase)
}

fn lower(value: &Value, _: &FilterArgs) -> Result<Value, String> {
	map_text(value, str::to_lowercase)
}

pub(crate) fn capitalize_word(word: &str) -> String {
	let mut chars = word.chars();
	match chars.next() {
		Some(first) => first.to_uppercase().chain(chars.as_str().to_lowercase().chars()).collect(),
		None => String::new(),
	}
}

fn capitalize(value: &Value, _: &FilterArgs) -> Result<Value, String> {
	map_text(value, capitalize_word)
}

/// Uppercase the first letter of every word and lowercase the rest.
pub(crate) fn title_case(text: &str) -> String {
	let mut titled = String::with_capacity(text.len());
	let mut at_word_start = true;
	for ch in text.chars() {
		if ch.is_alphanumeric() {
			if at_word_start {
				titled.extend(ch.to_uppercase());
			} else {
				titled.extend(ch.to_lowercase());
			}
			at_word_start = false;
		} else {
			titled.push(ch);
			at_word_start = ch != '\'';
		}
	}
	titled
}

fn title(value: &Value, _: &FilterArgs) -> Result<Value, String> {
	map_text(value, title_case)
}

fn trim(value: &Value, args: &FilterArgs) -> Result<Value, String> {
	let chars = args.get(0, "chars").and_then(Value::as_str).map(str::to_string);
	map_text(value, |text| {
		match &chars {
			Some(chars) => text.trim_matches(|ch: char| chars.contains(ch)).to_string(),
			None => text.trim().to_string(),
		}
	})
}

fn striptags(value: &Value, _: &FilterArgs) -> Result<Value, String> {
	let text = value.to_string();
	let mut stripped = String::with_capacity(text.len());
	let mut in_tag = false;

	for ch in text.chars() {
		match ch {
			'<' => in_tag = true,
			'>' if in_tag => in_tag = false,
			_ if !in_tag => stripped.push(ch),
			_ => {}
		}
	}

	Ok(Value::String(
		stripped.split_whitespace().collect::<Vec<_>>().join(" "),
	))
}

fn safe(value: &Value, _: &FilterArgs) -> Result<Value, String> {
	Ok(Value::safe(value.to_string()))
}

fn escape(value: &Value, _: &FilterArgs) -> Result<Value, String> {
	if value.is_safe() {
		return Ok(value.clone());
	}
	Ok(Value::safe(escape_html(&value.to_string())))
}

fn forceescape(value: &Value, _: &FilterArgs) -> Result<Value, String> {
	Ok(Value::safe(escape_html(&value.to_string())))
}

fn percent_encode(text: &str) -> String {
	let mut encoded = String::with_capacity(text.len());
	for byte in text.bytes() {
		if byte.is_ascii_alphanumeric() || matches!(byte, b'-' | b'_' | b'.' | b'~' | b'/') {
			encoded.push(char::from(byte));
		} else {
			encoded.push_str(&format!("%{byte:02X}"));
		}
	}
	encoded
}

fn urlencode(value: &Value, _: &FilterArgs) -> Result<Value, String> {
	let encoded = match value {
		Value::Map(map) => {
			map.iter()
				.map(|(key, value)| {
					format!(
						"{}={}",
						percent_encode(key),
						percent_encode(&value.to_string())
					)
				})
				.collect::<Vec<_>>()
				.join("&")
		}
		other => percent_encode(&other.to_string()),
	};
	Ok(Value::String(encoded))
}

fn replace(value: &Value, args: &FilterArgs) -> Result<Value, String> {
	let (Some(old), Some(new)) = (args.get(0, "old"), args.get(1, "new")) else {
		return Ok(value.clone());
	};
	let old = old.to_string();
	let new = new.to_string();
	let count = args.get(2, "count").and_then(Value::as_i64);

	map_text(value, |text| {
		if old.is_empty() {
			return text.to_string();
		}
		match count {
			Some(count) if count >= 0 => text.replacen(&old, &new, count as usize),
			_ => text.replace(&old, &new),
		}
	})
}

fn truncate(value: &Value, args: &FilterArgs) -> Result<Value, String> {
	let length = args.int(0, "length", 255).max(0) as usize;
	let killwords = args.flag(1, "killwords", false);
	let end = args.text(2, "end", "...");

	map_text(value, |text| {
		let chars: Vec<char> = text.chars().collect();
		if chars.len() <= length {
			return text.to_string();
		}

		let keep = length.saturating_sub(end.chars().count());
		let mut truncated: String = chars[..keep].iter().collect();
		if !killwords {
			if let Some(space) = truncated.rfind(' ').filter(|space| *space > 0) {
				truncated.truncate(space);
			}
		}
		truncated.push_str(&end);
		truncated
	})
}

fn wordwrap(value: &Value, args: &FilterArgs) -> Result<Value, String> {
	let width = args.int(0, "width", 79).max(1) as usize;
	let wrapstring = args.text(2, "wrapstring", "\n");

	map_text(value, |text| {
		let mut lines = vec![];
		for paragraph in text.split('\n') {
			let mut line = String::new();
			for word in paragraph.split(' ') {
				if !line.is_empty() && line.chars().count() + word.chars().count() + 1 > width {
					lines.push(std::mem::take(&mut line));
				}
				if !line.is_empty() {
					line.push(' ');
				}
				line.push_str(word);
			}
			if !line.is_empty() {
				lines.push(line);
			}
		}
		lines.join(&wrapstring)
	})
}

fn center(value: &Value, args: &FilterArgs) -> Result<Value, String> {
	let width = repeat_count(args.int(0, "width", 80))?;
	map_text(value, |text| {
		let len = text.chars().count();
		if len >= width {
			return text.to_string();
		}
		let left = (width + len) / 2 - len;
		let right = width - len - left;
		format!("{}{text}{}", " ".repeat(left), " ".repeat(right))
	})
}

fn indent(value: &Value, args: &FilterArgs) -> Result<Value, String> {
	let prefix = match args.get(0, "width") {
		Some(Value::String(text) | Value::Safe(text)) => text.clone(),
		other => " ".repeat(repeat_count(other.and_then(Value::as_i64).unwrap_or(4))?),
	};
	let first = args.flag(1, "first", false);

	map_text(value, |text| {
		text.split('\n')
			.enumerate()
			.map(|(index, line)| {
				if index > 0 || first {
					format!("{prefix}{line}")
				} else {
					line.to_string()
				}
			})
			.collect::<Vec<_>>()
			.join("\n")
	})
}

fn abs(value: &Value, _: &FilterArgs) -> Result<Value, String> {
	match value {
		Value::Int(number) => Ok(Value::Int(number.saturating_abs())),
		other => {
			other
				.to_f64_lossy()
				.map(|number| Value::Float(number.abs()))
				.ok_or_else(|| format!("cannot take the absolute value of {}", other.type_name()))
		}
	}
}

fn round(value: &Value, args: &FilterArgs) -> Result<Value, String> {
	let precision = args.int(0, "precision", 0).clamp(0, 15) as i32;
	let method = args.text(1, "method", "common");
	let number = value.to_f64_lossy().unwrap_or(0.0);
	let factor = 10f64.powi(precision);

	let rounded = match method.as_str() {
		"common" => (number * factor).round() / factor,
		"ceil" => (number * factor).ceil() / factor,
		"floor" => (number * factor).floor() / factor,
		other => return Err(format!("method must be 'common', 'ceil' or 'floor', got '{other}'")),
	};

	Ok(Value::Float(rounded))
}

fn int(value: &Value, args: &FilterArgs) -> Result<Value, String> {
	let default = args.get(0, "default").and_then(Value::as_i64).unwrap_or(0);
	let parsed = match value {
		Value::String(text) | Value::Safe(text) => {
			let text = text.trim();
			text.parse::<i64>()
				.ok()
				.or_else(|| text.parse::<f64>().ok().map(|number| number.trunc() as i64))
		}
		other => other.as_i64(),
	};
	Ok(Value::Int(parsed.unwrap_or(default)))
}

fn float(value: &Value, args: &FilterArgs) -> Result<Value, String> {
	let default = args.get(0, "default").and_then(Value::as_f64).unwrap_or(0.0);
	Ok(Value::Float(value.to_f64_lossy().unwrap_or(default)))
}

fn string(value: &Value, _: &FilterArgs) -> Result<Value, String> {
	Ok(match value {
		Value::Safe(_) => value.clone(),
		other => Value::String(other.to_string()),
	})
}

fn length(value: &Value, _: &FilterArgs) -> Result<Value, String> {
	Ok(Value::from(value.len().unwrap_or(0)))
}

fn first(value: &Value, _: &FilterArgs) -> Result<Value, String> {
	Ok(items_of(value).into_iter().next().unwrap_or_default())
}

fn last(value: &Value, _: &FilterArgs) -> Result<Value, String> {
	Ok(items_of(value).pop().unwrap_or_default())
}

fn reverse(value: &Value, _: &FilterArgs) -> Result<Value, String> {
	Ok(match value {
		Value::String(text) => Value::String(text.chars().rev().collect()),
		Value::Safe(text) => Value::Safe(text.chars().rev().collect()),
		Value::List(items) => Value::List(items.iter().rev().cloned().collect()),
		Value::Map(_) => Value::List(items_of(value).into_iter().rev().collect()),
		other => other.clone(),
	})
}

/// Ordering key used by `sort`, `unique`, `max` and `min`: strings compare
/// case-insensitively unless `case_sensitive` is set.
fn sort_key(value: &Value, attribute: Option<&str>, case_sensitive: bool) -> Value {
	let value = attribute.map_or_else(|| value.clone(), |path| attribute_path(value, path));
	match value {
		Value::String(text) | Value::Safe(text) if !case_sensitive => Value::String(text.to_lowercase()),
		other => other,
	}
}

fn compare_keys(left: &Value, right: &Value) -> Ordering {
	left.compare(right)
		.unwrap_or_else(|| left.to_string().cmp(&right.to_string()))
}

fn sort(value: &Value, args: &FilterArgs) -> Result<Value, String> {
	let reverse = args.flag(0, "reverse", false);
	let (case_sensitive, attribute) = match args.positional.get(1) {
		Some(Value::String(attribute)) if lookup_key(&args.named, "attribute").is_none() => {
			(false, Some(attribute.clone()))
		}
		_ => {
			(
				args.flag(1, "case_sensitive", false),
				args.get(2, "attribute").and_then(Value::as_str).map(str::to_string),
			)
		}
	};

	let mut items = items_of(value);
	items.sort_by(|left, right| {
		let ordering = compare_keys(
			&sort_key(left, attribute.as_deref(), case_sensitive),
			&sort_key(right, attribute.as_deref(), case_sensitive),
		);
		if reverse { ordering.reverse() } else { ordering }
	});

	Ok(Value::List(items))
}

fn join(value: &Value, args: &FilterArgs) -> Result<Value, String> {
	let separator = args.text(0, "d", "");
	let attribute = args.get(1, "attribute").and_then(Value::as_str);

	let Some(items) = value.to_items() else {
		return Ok(Value::String(value.to_string()));
	};

	let joined = items
		.iter()
		.map(|item| {
			attribute
				.map_or_else(|| item.clone(), |path| attribute_path(item, path))
				.to_string()
		})
		.collect::<Vec<_>>()
		.join(&separator);

	let all_safe = matches!(value, Value::List(items) if items.iter().all(Value::is_safe));
	Ok(if all_safe && !items.is_empty() {
		Value::Safe(joined)
	} else {
		Value::String(joined)
	})
}

fn unique(value: &Value, args: &FilterArgs) -> Result<Value, String> {
	let case_sensitive = args.flag(0, "case_sensitive", false);
	let attribute = args.get(1, "attribute").and_then(Value::as_str);
	let mut seen: Vec<Value> = vec![];
	let mut unique = vec![];

	for item in items_of(value) {
		let key = sort_key(&item, attribute, case_sensitive);
		if !seen.iter().any(|existing| existing.loose_eq(&key)) {
			seen.push(key);
			unique.push(item);
		}
	}

	Ok(Value::List(unique))
}

fn list(value: &Value, _: &FilterArgs) -> Result<Value, String> {
	Ok(Value::List(match value {
		Value::Undefined | Value::Null => vec![],
		other => other.to_items().unwrap_or_else(|| vec![other.clone()]),
	}))
}

fn batch(value: &Value, args: &FilterArgs) -> Result<Value, String> {
	let size = args.int(0, "linecount", 1);
	if size <= 0 {
		return Err("linecount must be positive".to_string());
	}
	let size = repeat_count(size)?;
	let fill = args.get(1, "fill_with").filter(|fill| !fill.is_none());

	let batches = items_of(value)
		.chunks(size)
		.map(|chunk| {
			let mut batch = chunk.to_vec();
			if let Some(fill) = fill {
				batch.resize(size, fill.clone());
			}
			Value::List(batch)
		})
		.collect();

	Ok(Value::List(batches))
}

fn slice(value: &Value, args: &FilterArgs) -> Result<Value, String> {
	let slices = args.int(0, "slices", 1);
	if slices <= 0 {
		return Err("slices must be positive".to_string());
	}
	let slices = repeat_count(slices)?;
	let fill = args.get(1, "fill_with").filter(|fill| !fill.is_none());
	let items = items_of(value);
	let per_slice = items.len() / slices;
	let with_extra = items.len() % slices;
	let mut offset = 0;
	let mut result = vec![];

	for index in 0..slices {
		let start = offset + index * per_slice;
		if index < with_extra {
			offset += 1;
		}
		let end = offset + (index + 1) * per_slice;
		let mut slice = items[start..end].to_vec();
		if let Some(fill) = fill {
			if index >= with_extra && with_extra > 0 {
				slice.push(fill.clone());
			}
		}
		result.push(Value::List(slice));
	}

	Ok(Value::List(result))
}

fn map(value: &Value, args: &FilterArgs) -> Result<Value, String> {
	let Some(attribute) = args.get(0, "attribute").and_then(Value::as_str) else {
		return Ok(value.clone());
	};
	let default = lookup_key(&args.named, "default");

	Ok(Value::List(
		items_of(value)
			.iter()
			.map(|item| {
				let mapped = attribute_path(item, attribute);
				match (mapped.is_undefined(), default) {
					(true, Some(default)) => default.clone(),
					_ => mapped,
				}
			})
			.collect(),
	))
}

/// Shared body of `select` and `reject`: keep items where the test result
/// equals `keep`.
fn filter_items(
	value: &Value,
	args: &FilterArgs,
	attribute: Option<&str>,
	test_index: usize,
	keep: bool,
) -> Value {
	let test = args.positional.get(test_index).and_then(Value::as_str);
	let test_args = args.positional.get(test_index + 1..).unwrap_or_default();

	Value::List(
		items_of(value)
			.into_iter()
			.filter(|item| {
				let subject = attribute.map_or_else(|| item.clone(), |path| attribute_path(item, path));
				let passed = match test {
					Some(test) => run_test(test, &subject, test_args).unwrap_or(false),
					None => subject.is_truthy(),
				};
				passed == keep
			})
			.collect(),
	)
}

fn select(value: &Value, args: &FilterArgs) -> Result<Value, String> {
	Ok(filter_items(value, args, None, 0, true))
}

fn reject(value: &Value, args: &FilterArgs) -> Result<Value, String> {
	Ok(filter_items(value, args, None, 0, false))
}

fn selectattr(value: &Value, args: &FilterArgs) -> Result<Value, String> {
	let Some(attribute) = args.positional.first().and_then(Value::as_str) else {
		return Ok(value.clone());
	};
	Ok(filter_items(value, args, Some(attribute), 1, true))
}

fn rejectattr(value: &Value, args: &FilterArgs) -> Result<Value, String> {
	let Some(attribute) = args.positional.first().and_then(Value::as_str) else {
		return Ok(value.clone());
	};
	Ok(filter_items(value, args, Some(attribute), 1, false))
}

fn sum(value: &Value, args: &FilterArgs) -> Result<Value, String> {
	let attribute = args.get(0, "attribute").and_then(Value::as_str);
	let start = args.get(1, "start").cloned().unwrap_or(Value::Int(0));
	let mut total = start;

	for item in items_of(value) {
		let item = attribute.map_or(item.clone(), |path| attribute_path(&item, path));
		total = match (&total, &item) {
			(Value::Int(left), Value::Int(right)) => Value::Int(left.saturating_add(*right)),
			(left, right) => {
				Value::Float(left.to_f64_lossy().unwrap_or(0.0) + right.to_f64_lossy().unwrap_or(0.0))
			}
		};
	}

	Ok(total)
}

fn extreme(value: &Value, args: &FilterArgs, wanted: Ordering) -> Value {
	let case_sensitive = args.flag(0, "case_sensitive", false);
	let attribute = args.get(1, "attribute").and_then(Value::as_str);

	items_of(value)
		.into_iter()
		.reduce(|best, item| {
			let ordering = compare_keys(
				&sort_key(&item, attribute, case_sensitive),
				&sort_key(&best, attribute, case_sensitive),
			);
			if ordering == wanted { item } else { best }
		})
		.unwrap_or_default()
}

fn max(value: &Value, args: &FilterArgs) -> Result<Value, String> {
	Ok(extreme(value, args, Ordering::Greater))
}

fn min(value: &Value, args: &FilterArgs) -> Result<Value, String> {
	Ok(extreme(value, args, Ordering::Less))
}

fn attr(value: &Value, args: &FilterArgs) -> Result<Value, String> {
	Ok(args
		.get(0, "name")
		.map_or_else(|| value.clone(), |name| value.get_attr(&name.to_string())))
}

fn pairs(map: &ValueMap) -> Vec<Value> {
	map.iter()
		.map(|(key, value)| Value::List(vec![Value::String(key.clone()), value.clone()]))
		.collect()
}

fn items(value: &Value, _: &FilterArgs) -> Result<Value, String> {
	Ok(Value::List(match value {
		Value::Map(map) => pairs(map),
		Value::Namespace(namespace) => pairs(&namespace.snapshot()),
		_ => vec![],
	}))
}

fn keys(value: &Value, _: &FilterArgs) -> Result<Value, String> {
	Ok(Value::List(match value {
		Value::Map(map) => map.keys().cloned().map(Value::String).collect(),
		_ => vec![],
	}))
}

fn values(value: &Value, _: &FilterArgs) -> Result<Value, String> {
	Ok(Value::List(match value {
		Value::Map(map) => map.values().cloned().collect(),
		_ => vec![],
	}))
}

fn dictsort(value: &Value, args: &FilterArgs) -> Result<Value, String> {
	let Value::Map(map) = value else {
		return Ok(value.clone());
	};

	let (case_sensitive, by, reverse) = match args.positional.first() {
		Some(Value::String(by)) => (false, by.clone(), args.flag(1, "reverse", false)),
		_ => {
			(
				args.flag(0, "case_sensitive", false),
				args.text(1, "by", "key"),
				args.flag(2, "reverse", false),
			)
		}
	};
	let by_value = match by.as_str() {
		"key" => false,
		"value" => true,
		other => return Err(format!("you can only sort by either 'key' or 'value', got '{other}'")),
	};

	let mut entries: Vec<(&String, &Value)> = map.iter().collect();
	entries.sort_by(|(left_key, left), (right_key, right)| {
		let ordering = if by_value {
			compare_keys(
				&sort_key(left, None, case_sensitive),
				&sort_key(right, None, case_sensitive),
			)
		} else if case_sensitive {
			left_key.cmp(right_key)
		} else {
			left_key.to_lowercase().cmp(&right_key.to_lowercase())
		};
		if reverse { ordering.reverse() } else { ordering }
	});

	Ok(Value::List(
		entries
			.into_iter()
			.map(|(key, value)| Value::List(vec![Value::String(key.clone()), value.clone()]))
			.collect(),
	))
}

fn default(value: &Value, args: &FilterArgs) -> Result<Value, String> {
	let fallback = args.get(0, "default_value").cloned().unwrap_or_else(|| Value::from(""));
	let boolean = args.flag(1, "boolean", false);

	if value.is_none() || (boolean && !value.is_truthy()) {
		Ok(fallback)
	} else {
		Ok(value.clone())
	}
}

fn tojson(value: &Value, args: &FilterArgs) -> Result<Value, String> {
	let json = value.to_json();
	let text = match args.get(0, "indent").and_then(Value::as_i64) {
		Some(indent) if indent > 0 => {
			let indent = " ".repeat(repeat_count(indent)?);
			let formatter = serde_json::ser::PrettyFormatter::with_indent(indent.as_bytes());
			let mut buffer = vec![];
			let mut serializer = serde_json::Serializer::with_formatter(&mut buffer, formatter);
			serde::Serialize::serialize(&json, &mut serializer).map_err(|e| e.to_string())?;
			String::from_utf8(buffer).map_err(|e| e.to_string())?
		}
		_ => serde_json::to_string(&json).map_err(|e| e.to_string())?,
	};

	Ok(Value::safe(
		text.replace('<', "\\u003c")
			.replace('>', "\\u003e")
			.replace('&', "\\u0026")
			.replace('\'', "\\u0027"),
	))
}

fn pprint(value: &Value, _: &FilterArgs) -> Result<Value, String> {
	serde_json::to_string_pretty(&value.to_json())
		.map(Value::String)
		.map_err(|e| e.to_string())
}

fn boolean(value: &Value, _: &FilterArgs) -> Result<Value, String> {
	Ok(Value::Bool(value.is_truthy()))
}

fn format(value: &Value, args: &FilterArgs) -> Result<Value, String> {
	if value.is_none() {
		return Ok(value.clone());
	}
	printf(&value.to_string(), args).map(Value::String)
}

/// `%`-style formatting: `%s %r %d %i %f %x %X %o %%`, with optional
/// `%(name)s` keys, flags, width and precision.
pub(crate) fn printf(template: &str, args: &FilterArgs) -> Result<String, String> {
	let mut output = String::with_capacity(template.len());
	let mut chars = template.chars().peekable();
	let mut next_arg = 0;

	while let Some(ch) = chars.next() {
		if ch != '%' {
			output.push(ch);
			continue;
		}

		let mut key = None;
		if chars.peek() == Some(&'(') {
			chars.next();
			let mut name = String::new();
			loop {
				match chars.next() {
					Some(')') => break,
					Some(ch) => name.push(ch),
					None => return Err("incomplete format key".to_string()),
				}
			}
			key = Some(name);
		}

		let mut flags = String::new();
		while let Some(&flag) = chars.peek() {
			if !"-+ 0#".contains(flag) {
				break;
			}
			flags.push(flag);
			chars.next();
		}

		let mut width = String::new();
		while let Some(&digit) = chars.peek().filter(|ch| ch.is_ascii_digit()) {
			width.push(digit);
			chars.next();
		}

		let mut precision = None;
		if chars.peek() == Some(&'.') {
			chars.next();
			let mut digits = String::new();
			while let Some(&digit) = chars.peek().filter(|ch| ch.is_ascii_digit()) {
				digits.push(digit);
				chars.next();
			}
			precision = Some(digits.parse::<usize>().unwrap_or(0));
		}

		let Some(conversion) = chars.next() else {
			return Err("incomplete format".to_string());
		};
		if conversion == '%' {
			output.push('%');
			continue;
		}

		let argument = match &key {
			Some(name) => lookup_key(&args.named, name).cloned().unwrap_or_default(),
			None => {
				let argument = args
					.positional
					.get(next_arg)
					.cloned()
					.ok_or_else(|| "not enough arguments for format string".to_string())?;
				next_arg += 1;
				argument
			}
		};

		let number = || {
			argument.to_f64_lossy().ok_or_else(|| {
				format!(
					"%{conversion} format: a number is required, not {}",
					argument.type_name()
				)
			})
		};

		let mut text = match conversion {
			's' => {
				let text = argument.to_string();
				match precision {
					Some(precision) => text.chars().take(precision).collect(),
					None => text,
				}
			}
			'r' => argument.repr(),
			'd' | 'i' => (number()?.trunc() as i64).to_string(),
			'f' | 'F' => format!("{:.*}", precision.unwrap_or(6), number()?),
			'x' => format!("{:x}", number()? as i64),
			'X' => format!("{:X}", number()? as i64),
			'o' => format!("{:o}", number()? as i64),
			other => return Err(format!("unsupported format character '{other}'")),
		};

		let numeric = !matches!(conversion, 's' | 'r');
		if numeric && flags.contains('+') && !text.starts_with('-') {
			text.insert(0, '+');
		}

		let width = repeat_count(width.parse::<i64>().unwrap_or(0))?;
		let len = text.chars().count();
		if len < width {
			let padding = width - len;
			if flags.contains('-') {
				text.push_str(&" ".repeat(padding));
			} else if flags.contains('0') && numeric {
				let sign_len = usize::from(text.starts_with(['-', '+']));
				text.insert_str(sign_len, &"0".repeat(padding));
			} else {
				text.insert_str(0, &" ".repeat(padding));
			}
		}

		output.push_str(&text);
	}

	Ok(output)
}

fn filesizeformat(value: &Value, _: &FilterArgs) -> Result<Value, String> {
	const UNITS: [&str; 5] = ["Bytes", "KB", "MB", "GB", "TB"];
	let mut size = value.to_f64_lossy().unwrap_or(0.0);
	let mut unit = 0;

	while size >= 1024.0 && unit < UNITS.len() - 1 {
		size /= 1024.0;
		unit += 1;
	}

	let rounded = (size * 100.0).round() / 100.0;
	Ok(Value::String(format!("{} {}", format_float(rounded), UNITS[unit])))
}

fn wordcount(value: &Value, _: &FilterArgs) -> Result<Value, String> {
	Ok(Value::from(value.to_string().split_whitespace().count()))
}

fn xmlattr(value: &Value, _: &FilterArgs) -> Result<Value, String> {
	let Value::Map(map) = value else {
		return Ok(Value::safe(""));
	};

	let attrs = map
		.iter()
		.filter(|(_, value)| !value.is_none())
		.map(|(key, value)| format!("{key}=\"{}\"", escape_html(&value.to_string())))
		.collect::<Vec<_>>()
		.join(" ");

	Ok(Value::safe(attrs))
}

fn random(value: &Value, _: &FilterArgs) -> Result<Value, String> {
	let Some(items) = value.to_items() else {
		return Ok(value.clone());
	};
	if items.is_empty() {
		return Ok(Value::Undefined);
	}

	let index = RandomState::new().hash_one(items.len()) as usize % items.len();
	Ok(items[index].clone())
}

fn groupby(value: &Value, args: &FilterArgs) -> Result<Value, String> {
	let Some(attribute) = args.get(0, "attribute").and_then(Value::as_str) else {
		return Ok(value.clone());
	};

	let mut groups: Vec<(Value, Vec<Value>)> = vec![];
	for item in items_of(value) {
		let grouper = attribute_path(&item, attribute);
		match groups.iter_mut().find(|(key, _)| key.loose_eq(&grouper)) {
			Some((_, members)) => members.push(item),
			None => groups.push((grouper, vec![item])),
		}
	}

	Ok(Value::List(
		groups
			.into_iter()
			.map(|(grouper, members)| {
				let mut group = ValueMap::new();
				group.insert("grouper".to_string(), grouper);
				group.insert("list".to_string(), Value::List(members));
				Value::Map(group)
			})
			.collect(),
	))
}
