use std::cmp::Ordering;

use crate::Value;

/// Run the `is` test called `name` against `value`.
///
/// Returns `None` for unknown tests so callers can decide how to degrade.
pub fn run_test(name: &str, value: &Value, args: &[Value]) -> Option<bool> {
	let arg = args.first().cloned().unwrap_or_default();

	let result = match name.to_ascii_lowercase().as_str() {
		"defined" => !value.is_undefined(),
		"undefined" => value.is_undefined(),
		"none" => matches!(value, Value::Null),
		"true" => matches!(value, Value::Bool(true)),
		"false" => matches!(value, Value::Bool(false)),
		"boolean" => matches!(value, Value::Bool(_)),
		"string" => value.is_string(),
		"number" => value.is_number(),
		"integer" => matches!(value, Value::Int(_)),
		"float" => matches!(value, Value::Float(_)),
		"sequence" => matches!(value, Value::List(_) | Value::String(_) | Value::Safe(_)),
		"iterable" => value.to_items().is_some(),
		"mapping" => matches!(value, Value::Map(_) | Value::Namespace(_)),
		"callable" => value.is_callable(),
		"escaped" => value.is_safe(),
		"empty" => value.is_empty(),
		"odd" => value.as_i64().is_some_and(|number| number % 2 != 0),
		"even" => value.as_i64().is_some_and(|number| number % 2 == 0),
		"lower" => value.as_str().is_some_and(|text| text.to_lowercase() == text),
		"upper" => value.as_str().is_some_and(|text| text.to_uppercase() == text),
		"divisibleby" => {
			match (value.as_i64(), arg.as_i64()) {
				(Some(_), Some(0)) | (None, _) | (_, None) => false,
				(Some(number), Some(divisor)) => number % divisor == 0,
			}
		}
		"sameas" => value == &arg,
		"equalto" | "eq" | "==" => value.loose_eq(&arg),
		"ne" | "!=" => !value.loose_eq(&arg),
		"greaterthan" | "gt" | ">" => value.compare(&arg) == Some(Ordering::Greater),
		"lessthan" | "lt" | "<" => value.compare(&arg) == Some(Ordering::Less),
		"ge" | ">=" => matches!(value.compare(&arg), Some(Ordering::Greater | Ordering::Equal)),
		"le" | "<=" => matches!(value.compare(&arg), Some(Ordering::Less | Ordering::Equal)),
		"in" => arg.contains(value),
		_ => return None,
	};

	Some(result)
}
