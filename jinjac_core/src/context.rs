use std::sync::Arc;

use derive_more::Deref;
use derive_more::DerefMut;
use indexmap::IndexMap;
use serde::Serialize;

use crate::JinjacError;
use crate::JinjacResult;
use crate::Value;
use crate::ValueMap;

/// One binding frame. Names are stored lowercased so lookups are
/// case-insensitive.
#[derive(Debug, Clone, Default, Deref, DerefMut)]
pub struct Scope(IndexMap<String, Value>);

impl Scope {
	pub fn get_var(&self, name: &str) -> Option<&Value> {
		self.0.get(&name.to_lowercase())
	}

	pub fn set_var(&mut self, name: &str, value: Value) {
		self.0.insert(name.to_lowercase(), value);
	}
}

/// The variable environment of a render: a stack of scopes with an optional
/// parent context consulted after every local scope.
#[derive(Debug, Clone)]
pub struct RenderContext {
	scopes: Vec<Scope>,
	parent: Option<Arc<RenderContext>>,
}

impl Default for RenderContext {
	fn default() -> Self {
		Self::new()
	}
}

impl RenderContext {
	pub fn new() -> Self {
		Self {
			scopes: vec![Scope::default()],
			parent: None,
		}
	}

	/// A fresh context whose lookups fall back to `parent`.
	pub fn with_parent(parent: Arc<RenderContext>) -> Self {
		Self {
			scopes: vec![Scope::default()],
			parent: Some(parent),
		}
	}

	/// Build a context from a JSON object. Non-object values produce an empty
	/// context.
	pub fn from_json(data: serde_json::Value) -> Self {
		let mut context = Self::new();
		if let Value::Map(map) = Value::from(data) {
			context.extend(map);
		}
		context
	}

	/// Build a context from any serializable value that serializes to a map.
	pub fn from_serialize<T: Serialize>(data: &T) -> JinjacResult<Self> {
		let json = serde_json::to_value(data).map_err(|e| {
			JinjacError::DataFile {
				path: "<context>".to_string(),
				reason: e.to_string(),
			}
		})?;
		Ok(Self::from_json(json))
	}

	pub fn parent(&self) -> Option<&Arc<RenderContext>> {
		self.parent.as_ref()
	}

	pub fn depth(&self) -> usize {
		self.scopes.len()
	}

	pub fn push_scope(&mut self) {
		self.scopes.push(Scope::default());
	}

	/// Pop the innermost scope. The root scope is never removed.
	pub fn pop_scope(&mut self) {
		if self.scopes.len() > 1 {
			self.scopes.pop();
		}
	}

	/// Bind `name` in the innermost scope.
	pub fn set(&mut self, name: &str, value: impl Into<Value>) {
		if let Some(scope) = self.scopes.last_mut() {
			scope.set_var(name, value.into());
		}
	}

	/// Bind every entry of `values` in the innermost scope.
	pub fn extend(&mut self, values: ValueMap) {
		for (name, value) in values {
			self.set(&name, value);
		}
	}

	/// Look `name` up from the innermost scope outwards, then in the parent.
	pub fn get(&self, name: &str) -> Option<&Value> {
		let key = name.to_lowercase();
		self.scopes
			.iter()
			.rev()
			.find_map(|scope| scope.get(&key))
			.or_else(|| self.parent.as_ref().and_then(|parent| parent.get(name)))
	}

	pub fn contains(&self, name: &str) -> bool {
		self.get(name).is_some()
	}

	/// Every visible binding, inner scopes shadowing outer ones.
	pub fn flatten(&self) -> ValueMap {
		let mut values = self
			.parent
			.as_ref()
			.map(|parent| parent.flatten())
			.unwrap_or_default();

		for scope in &self.scopes {
			for (name, value) in scope.iter() {
				values.insert(name.clone(), value.clone());
			}
		}

		values
	}
}
