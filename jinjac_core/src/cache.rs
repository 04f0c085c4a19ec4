use std::collections::HashMap;
use std::sync::Arc;
use std::sync::PoisonError;
use std::sync::RwLock;

use tracing::debug;

use crate::JinjacResult;
use crate::TemplateLoader;
use crate::ast::Template;
use crate::lexer::LexerOptions;
use crate::loader::normalize_path;
use crate::parser::parse_source;

/// Parsed templates memoized by normalized path.
///
/// Templates are parsed lazily on first use. The map sits behind an `RwLock`
/// so a cache can be shared by concurrent renders.
#[derive(Debug)]
pub struct TemplateCache {
	loader: Arc<dyn TemplateLoader>,
	options: LexerOptions,
	templates: RwLock<HashMap<String, Arc<Template>>>,
}

impl TemplateCache {
	pub fn new(loader: Arc<dyn TemplateLoader>, options: LexerOptions) -> Self {
		Self {
			loader,
			options,
			templates: RwLock::new(HashMap::new()),
		}
	}

	/// The cache key for `path`: forward slashes, no leading separator,
	/// lowercased.
	pub fn key(path: &str) -> String {
		normalize_path(path).to_lowercase()
	}

	pub fn loader(&self) -> &Arc<dyn TemplateLoader> {
		&self.loader
	}

	/// Return the parsed template at `path`, loading and parsing it on a miss.
	pub fn get(&self, path: &str) -> JinjacResult<Arc<Template>> {
		let key = Self::key(path);

		{
			let templates = self.templates.read().unwrap_or_else(PoisonError::into_inner);
			if let Some(template) = templates.get(&key) {
				debug!(template = %key, "template cache hit");
				return Ok(Arc::clone(template));
			}
		}

		debug!(template = %key, "template cache miss");
		let name = normalize_path(path);
		let source = self.loader.load(&name)?;
		let template = Arc::new(parse_source(&source, &name, self.options)?);

		let mut templates = self.templates.write().unwrap_or_else(PoisonError::into_inner);
		let template = templates.entry(key).or_insert(template);
		Ok(Arc::clone(template))
	}

	pub fn contains(&self, path: &str) -> bool {
		self.templates
			.read()
			.unwrap_or_else(PoisonError::into_inner)
			.contains_key(&Self::key(path))
	}

	/// Drop the parsed template at `path` so the next lookup reparses it.
	pub fn invalidate(&self, path: &str) -> bool {
		self.templates
			.write()
			.unwrap_or_else(PoisonError::into_inner)
			.remove(&Self::key(path))
			.is_some()
	}

	pub fn clear(&self) {
		self.templates
			.write()
			.unwrap_or_else(PoisonError::into_inner)
			.clear();
	}

	pub fn len(&self) -> usize {
		self.templates
			.read()
			.unwrap_or_else(PoisonError::into_inner)
			.len()
	}

	pub fn is_empty(&self) -> bool {
		self.len() == 0
	}
}
