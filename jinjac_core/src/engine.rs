use std::path::PathBuf;
use std::sync::Arc;

use crate::FileSystemLoader;
use crate::FilterArgs;
use crate::FilterRegistry;
use crate::InheritanceResolver;
use crate::JinjacResult;
use crate::MemoryLoader;
use crate::MissingVariableBehavior;
use crate::RenderContext;
use crate::RenderOptions;
use crate::RenderOutput;
use crate::Renderer;
use crate::ResolvedTemplate;
use crate::TemplateCache;
use crate::TemplateLoader;
use crate::Value;
use crate::evaluator::Evaluator;
use crate::lexer::LexerOptions;
use crate::parser::parse_source;

/// The name given to templates rendered from a string.
pub const STRING_TEMPLATE_NAME: &str = "<string>";

/// Owns the loader, template cache, filters and render options.
///
/// An engine is built once and shared; every render call gets its own
/// context and helper state.
///
/// ```rust
/// use jinjac_core::Engine;
/// use jinjac_core::RenderContext;
///
/// let engine = Engine::builder()
/// 	.templates([("hello.html", "Hello {{ name|upper }}!")])
/// 	.build()?;
///
/// let mut context = RenderContext::new();
/// context.set("name", "world");
/// assert_eq!(engine.render("hello.html", &context)?, "Hello WORLD!");
/// # Ok::<(), jinjac_core::JinjacError>(())
/// ```
#[derive(Debug)]
pub struct Engine {
	cache: TemplateCache,
	filters: FilterRegistry,
	options: RenderOptions,
	lexer: LexerOptions,
}

impl Engine {
	pub fn builder() -> EngineBuilder {
		EngineBuilder::default()
	}

	pub fn options(&self) -> &RenderOptions {
		&self.options
	}

	pub fn filters(&self) -> &FilterRegistry {
		&self.filters
	}

	pub fn cache(&self) -> &TemplateCache {
		&self.cache
	}

	pub fn loader(&self) -> &Arc<dyn TemplateLoader> {
		self.cache.loader()
	}

	/// Render the template at `path`.
	pub fn render(&self, path: &str, context: &RenderContext) -> JinjacResult<String> {
		Ok(self.render_with_assets(path, context)?.html)
	}

	/// Render the template at `path` with a JSON object as its context.
	pub fn render_json(&self, path: &str, data: serde_json::Value) -> JinjacResult<String> {
		self.render(path, &RenderContext::from_json(data))
	}

	/// Render template source that is not stored in the loader. The source may
	/// still extend, include and import loader templates.
	pub fn render_str(&self, source: &str, context: &RenderContext) -> JinjacResult<String> {
		let template = Arc::new(parse_source(source, STRING_TEMPLATE_NAME, self.lexer)?);
		let resolved = InheritanceResolver::new(&self.cache).resolve_template(template)?;
		Ok(self.render_resolved(resolved, context)?.html)
	}

	/// Render the template at `path`, also returning warnings and the static
	/// assets it referenced.
	pub fn render_with_assets(&self, path: &str, context: &RenderContext) -> JinjacResult<RenderOutput> {
		let resolved = self.resolve(path)?;
		self.render_resolved(resolved, context)
	}

	/// Load, parse and resolve the inheritance chain of `path` without
	/// rendering it.
	pub fn resolve(&self, path: &str) -> JinjacResult<ResolvedTemplate> {
		InheritanceResolver::new(&self.cache).resolve(path)
	}

	fn render_resolved(&self, resolved: ResolvedTemplate, context: &RenderContext) -> JinjacResult<RenderOutput> {
		let mut context = context.clone();
		Renderer::new(&self.cache, &self.filters, &self.options).render(resolved, &mut context)
	}

	/// Evaluate a standalone expression such as `user.name|upper`.
	pub fn evaluate(&self, expression: &str, context: &RenderContext) -> JinjacResult<Value> {
		self.evaluator().evaluate(expression, context)
	}

	/// Evaluate a standalone expression for its truthiness.
	pub fn evaluate_condition(&self, expression: &str, context: &RenderContext) -> JinjacResult<bool> {
		self.evaluator().evaluate_condition(expression, context)
	}

	fn evaluator(&self) -> Evaluator<'_> {
		Evaluator::new(&self.filters, Arc::from("<expression>"), &self.options.static_prefix)
	}

	pub fn list_templates(&self) -> JinjacResult<Vec<String>> {
		self.cache.loader().list_all()
	}

	pub fn template_exists(&self, path: &str) -> bool {
		self.cache.loader().exists(path)
	}

	/// Drop the cached parse of `path`. Returns whether it was cached.
	pub fn invalidate(&self, path: &str) -> bool {
		self.cache.invalidate(path)
	}

	pub fn clear_cache(&self) {
		self.cache.clear();
	}
}

#[derive(Debug)]
enum LoaderSource {
	Memory(MemoryLoader),
	Directory(PathBuf),
	Custom(Arc<dyn TemplateLoader>),
}

impl Default for LoaderSource {
	fn default() -> Self {
		Self::Memory(MemoryLoader::new())
	}
}

/// Configures and builds an [`Engine`].
#[derive(Debug, Default)]
pub struct EngineBuilder {
	loader: LoaderSource,
	filters: FilterRegistry,
	options: RenderOptions,
	lexer: LexerOptions,
}

impl EngineBuilder {
	/// Serve templates from a custom loader.
	#[must_use]
	pub fn loader(mut self, loader: impl TemplateLoader + 'static) -> Self {
		self.loader = LoaderSource::Custom(Arc::new(loader));
		self
	}

	/// Serve templates from memory. Repeated calls add to the same set.
	#[must_use]
	pub fn templates<I, K, V>(mut self, templates: I) -> Self
	where
		I: IntoIterator<Item = (K, V)>,
		K: AsRef<str>,
		V: Into<String>,
	{
		let mut memory = match self.loader {
			LoaderSource::Memory(memory) => memory,
			_ => MemoryLoader::new(),
		};
		for (path, source) in templates {
			memory.add(path.as_ref(), source);
		}
		self.loader = LoaderSource::Memory(memory);
		self
	}

	/// Serve templates from a directory with the default extensions.
	#[must_use]
	pub fn template_dir(mut self, root: impl Into<PathBuf>) -> Self {
		self.loader = LoaderSource::Directory(root.into());
		self
	}

	#[must_use]
	pub fn autoescape(mut self, enabled: bool) -> Self {
		self.options.autoescape = enabled;
		self
	}

	#[must_use]
	pub fn missing_variable(mut self, behavior: MissingVariableBehavior) -> Self {
		self.options.missing_variable = behavior;
		self
	}

	#[must_use]
	pub fn trim_blocks(mut self, enabled: bool) -> Self {
		self.lexer.trim_blocks = enabled;
		self
	}

	#[must_use]
	pub fn lstrip_blocks(mut self, enabled: bool) -> Self {
		self.lexer.lstrip_blocks = enabled;
		self
	}

	#[must_use]
	pub fn keep_trailing_newline(mut self, enabled: bool) -> Self {
		self.options.keep_trailing_newline = enabled;
		self
	}

	/// URL prefix that `url_for('static', filename=...)` prepends.
	#[must_use]
	pub fn static_prefix(mut self, prefix: impl Into<String>) -> Self {
		self.options.static_prefix = prefix.into();
		self
	}

	/// Register a custom filter, replacing any built-in of the same name.
	#[must_use]
	pub fn filter<F>(mut self, name: &str, filter: F) -> Self
	where
		F: Fn(&Value, &FilterArgs) -> Result<Value, String> + Send + Sync + 'static,
	{
		self.filters.register(name, filter);
		self
	}

	pub fn build(self) -> JinjacResult<Engine> {
		let loader: Arc<dyn TemplateLoader> = match self.loader {
			LoaderSource::Memory(memory) => Arc::new(memory),
			LoaderSource::Directory(root) => Arc::new(FileSystemLoader::new(root)?),
			LoaderSource::Custom(loader) => loader,
		};

		Ok(Engine {
			cache: TemplateCache::new(loader, self.lexer),
			filters: self.filters,
			options: self.options,
			lexer: self.lexer,
		})
	}
}
