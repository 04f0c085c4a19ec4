use std::collections::HashMap;
use std::sync::Arc;

use serde::Deserialize;
use serde::Serialize;
use tracing::debug;
use tracing::warn;

use crate::FilterRegistry;
use crate::InheritanceResolver;
use crate::JinjacError;
use crate::JinjacResult;
use crate::Position;
use crate::RenderContext;
use crate::ResolvedTemplate;
use crate::TemplateCache;
use crate::Value;
use crate::ValueMap;
use crate::ast::Expr;
use crate::ast::ForNode;
use crate::ast::IncludeNode;
use crate::ast::MacroCallNode;
use crate::ast::MacroDef;
use crate::ast::Node;
use crate::ast::SetNode;
use crate::ast::SetTarget;
use crate::ast::SetValue;
use crate::ast::VariableNode;
use crate::evaluator::Evaluator;
use crate::evaluator::RenderHooks;
use crate::filters::escape_html;
use crate::resolver::collect_macros;
use crate::value::MacroModule;
use crate::value::MacroRef;

/// Deepest nesting of macro calls, includes, blocks and recursive loops.
pub const MAX_RENDER_DEPTH: usize = 100;

/// What a `{{ expr }}` that evaluates to undefined renders as.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MissingVariableBehavior {
	/// Render nothing.
	#[default]
	#[serde(alias = "empty")]
	EmptyString,
	/// Fail with [`JinjacError::MissingVariable`].
	#[serde(alias = "strict", alias = "throw")]
	ThrowException,
	/// Render the expression back as `{{ expr }}` and record a warning.
	#[serde(alias = "placeholder")]
	ShowPlaceholder,
	/// Render the word `undefined`.
	Undefined,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderOptions {
	pub autoescape: bool,
	pub missing_variable: MissingVariableBehavior,
	pub keep_trailing_newline: bool,
	pub static_prefix: String,
}

impl Default for RenderOptions {
	fn default() -> Self {
		Self {
			autoescape: true,
			missing_variable: MissingVariableBehavior::EmptyString,
			keep_trailing_newline: true,
			static_prefix: "/static/".to_string(),
		}
	}
}

/// The result of rendering a template.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RenderOutput {
	pub html: String,
	pub template_path: String,
	/// Non-fatal problems, such as placeholder substitutions and skipped
	/// includes.
	pub warnings: Vec<String>,
	/// Static files referenced through `url_for('static', ...)`, in order of
	/// first use.
	pub assets: Vec<String>,
}

/// An active `for ... recursive` loop that `loop(items)` re-enters.
#[derive(Debug, Clone)]
struct RecursiveLoop {
	node: Arc<ForNode>,
	depth: usize,
}

/// The block currently rendering and how far up the chain its definition is.
#[derive(Debug, Clone)]
struct ActiveBlock {
	name: String,
	level: usize,
}

/// Walks a [`ResolvedTemplate`] and writes its output.
///
/// One renderer serves one render call: cyclers, joiners, warnings and assets
/// never outlive it.
pub struct Renderer<'e> {
	cache: &'e TemplateCache,
	filters: &'e FilterRegistry,
	options: &'e RenderOptions,
	resolved: Option<Arc<ResolvedTemplate>>,
	template: Arc<str>,
	autoescape: bool,
	blocks: Vec<ActiveBlock>,
	loops: Vec<RecursiveLoop>,
	modules: HashMap<String, Arc<MacroModule>>,
	depth: usize,
	warnings: Vec<String>,
	assets: Vec<String>,
}

impl<'e> Renderer<'e> {
	pub fn new(cache: &'e TemplateCache, filters: &'e FilterRegistry, options: &'e RenderOptions) -> Self {
		Self {
			cache,
			filters,
			options,
			resolved: None,
			template: Arc::from(""),
			autoescape: options.autoescape,
			blocks: vec![],
			loops: vec![],
			modules: HashMap::new(),
			depth: 0,
			warnings: vec![],
			assets: vec![],
		}
	}

	/// Render `resolved` against `context`.
	pub fn render(mut self, resolved: ResolvedTemplate, context: &mut RenderContext) -> JinjacResult<RenderOutput> {
		let template_path = resolved.path.clone();
		let mut html = String::new();
		self.render_resolved(Arc::new(resolved), context, &mut html)?;

		if !self.options.keep_trailing_newline {
			if html.ends_with("\r\n") {
				html.truncate(html.len() - 2);
			} else if html.ends_with('\n') {
				html.truncate(html.len() - 1);
			}
		}

		Ok(RenderOutput {
			html,
			template_path,
			warnings: self.warnings,
			assets: self.assets,
		})
	}

	fn evaluator(&self, position: Position) -> Evaluator<'e> {
		let options: &'e RenderOptions = self.options;
		Evaluator::new(self.filters, Arc::clone(&self.template), &options.static_prefix).at(position)
	}

	fn enter(&mut self, position: Position) -> JinjacResult<()> {
		if self.depth >= MAX_RENDER_DEPTH {
			return Err(JinjacError::render(
				format!("maximum render depth of {MAX_RENDER_DEPTH} exceeded"),
				&self.template,
				position,
			));
		}
		self.depth += 1;
		Ok(())
	}

	fn leave(&mut self) {
		self.depth = self.depth.saturating_sub(1);
	}

	fn warn(&mut self, message: String) {
		warn!(template = %self.template, "{message}");
		self.warnings.push(message);
	}

	/// Render a resolved template: the preamble of every child template, then
	/// the root layout. Template-level state is restored afterwards.
	fn render_resolved(
		&mut self,
		resolved: Arc<ResolvedTemplate>,
		context: &mut RenderContext,
		out: &mut String,
	) -> JinjacResult<()> {
		for (key, module) in &resolved.modules {
			self.modules.insert(key.clone(), Arc::clone(module));
		}

		let previous_resolved = self.resolved.replace(Arc::clone(&resolved));
		let previous_template = std::mem::replace(&mut self.template, Arc::from(resolved.path.as_str()));
		let previous_blocks = std::mem::take(&mut self.blocks);

		let result = self.render_layout(&resolved, context, out);

		self.resolved = previous_resolved;
		self.template = previous_template;
		self.blocks = previous_blocks;
		result
	}

	fn render_layout(
		&mut self,
		resolved: &ResolvedTemplate,
		context: &mut RenderContext,
		out: &mut String,
	) -> JinjacResult<()> {
		let mut discarded = String::new();
		for preamble in &resolved.preamble {
			self.template = Arc::from(preamble.template.as_str());
			self.render_node(&preamble.node, context, &mut discarded)?;
		}

		self.template = Arc::from(resolved.root.as_str());
		self.render_nodes(&resolved.nodes, context, out)
	}

	fn render_nodes(&mut self, nodes: &[Node], context: &mut RenderContext, out: &mut String) -> JinjacResult<()> {
		for node in nodes {
			self.render_node(node, context, out)?;
		}
		Ok(())
	}

	fn render_node(&mut self, node: &Node, context: &mut RenderContext, out: &mut String) -> JinjacResult<()> {
		match node {
			Node::Text(node) => out.push_str(&node.text),
			Node::Raw(node) => out.push_str(&node.text),
			Node::Comment(_) | Node::Extends(_) => {}
			Node::Variable(node) => self.render_variable(node, context, out)?,
			Node::Block(node) => {
				self.enter(node.position)?;
				let result = self.render_block(&node.name, 0, &node.body, context, out);
				self.leave();
				result?;
			}
			Node::Super(node) => {
				let value = self.evaluator(node.position).eval(&Expr::Super, context, self)?;
				out.push_str(&value.to_string());
			}
			Node::Include(node) => self.render_include(node, context, out)?,
			Node::If(node) => {
				let evaluator = self.evaluator(node.position);
				if evaluator.eval(&node.condition, context, self)?.is_truthy() {
					return self.render_nodes(&node.body, context, out);
				}
				for branch in &node.elifs {
					let evaluator = self.evaluator(branch.position);
					if evaluator.eval(&branch.condition, context, self)?.is_truthy() {
						return self.render_nodes(&branch.body, context, out);
					}
				}
				if let Some(else_body) = &node.else_body {
					self.render_nodes(else_body, context, out)?;
				}
			}
			Node::For(node) => {
				let iterable = self.evaluator(node.position).eval(&node.iterable, context, self)?;
				let recursive = node.recursive.then(|| Arc::new(node.clone()));
				self.render_loop(node, recursive, iterable, 0, context, out)?;
			}
			Node::Set(node) => self.render_set(node, context)?,
			Node::Macro(node) => {
				let reference = self.macro_ref(Arc::clone(&node.def), None);
				context.set(&node.def.name, Value::Macro(Arc::new(reference)));
			}
			Node::MacroCall(node) => self.render_call_block(node, context, out)?,
			Node::Import(node) => {
				let module = self.import(&node.target, node.position, context)?;
				let exported: ValueMap = module
					.iter()
					.map(|(name, def)| {
						let reference = MacroRef {
							def: Arc::clone(def),
							module: Arc::clone(&module.module),
							template: module.template.clone(),
							closure: None,
						};
						(name.clone(), Value::Macro(Arc::new(reference)))
					})
					.collect();
				context.set(&node.alias, Value::Map(exported));
			}
			Node::FromImport(node) => {
				let module = self.import(&node.target, node.position, context)?;
				for name in &node.names {
					let Some(def) = module.get(&name.name.to_lowercase()) else {
						return Err(JinjacError::render(
							format!("template '{}' has no macro named '{}'", module.template, name.name),
							&self.template,
							node.position,
						));
					};
					let reference = MacroRef {
						def: Arc::clone(def),
						module: Arc::clone(&module.module),
						template: module.template.clone(),
						closure: None,
					};
					context.set(name.binding(), Value::Macro(Arc::new(reference)));
				}
			}
			Node::With(node) => {
				let evaluator = self.evaluator(node.position);
				let mut values = vec![];
				for (name, expr) in &node.bindings {
					values.push((name, evaluator.eval(expr, context, self)?));
				}

				context.push_scope();
				for (name, value) in values {
					context.set(name, value);
				}
				let result = self.render_nodes(&node.body, context, out);
				context.pop_scope();
				result?;
			}
			Node::Autoescape(node) => {
				let enabled = self.evaluator(node.position).eval(&node.enabled, context, self)?.is_truthy();
				let previous = std::mem::replace(&mut self.autoescape, enabled);
				let result = self.render_nodes(&node.body, context, out);
				self.autoescape = previous;
				result?;
			}
			Node::FilterBlock(node) => {
				let mut body = String::new();
				self.render_nodes(&node.body, context, &mut body)?;

				let evaluator = self.evaluator(node.position);
				let mut value = Value::safe(body);
				for filter in &node.filters {
					value = evaluator.apply_filter(filter, &value, context, self)?;
				}
				self.write_value(&value, out);
			}
		}

		Ok(())
	}

	fn write_value(&self, value: &Value, out: &mut String) {
		if self.autoescape && !value.is_safe() {
			out.push_str(&escape_html(&value.to_string()));
		} else {
			out.push_str(&value.to_string());
		}
	}

	fn render_variable(&mut self, node: &VariableNode, context: &mut RenderContext, out: &mut String) -> JinjacResult<()> {
		let evaluator = self.evaluator(node.position);
		let mut value = evaluator.eval(&node.expr, context, self)?;
		for filter in &node.filters {
			value = evaluator.apply_filter(filter, &value, context, self)?;
		}

		if !value.is_undefined() {
			self.write_value(&value, out);
			return Ok(());
		}

		match self.options.missing_variable {
			MissingVariableBehavior::EmptyString => {}
			MissingVariableBehavior::Undefined => out.push_str("undefined"),
			MissingVariableBehavior::ThrowException => {
				return Err(JinjacError::MissingVariable {
					name: node.expr.dotted_name().unwrap_or_else(|| node.source.clone()),
					template: self.template.to_string(),
					line: node.position.line,
					column: node.position.column,
				});
			}
			MissingVariableBehavior::ShowPlaceholder => {
				self.warn(format!(
					"undefined variable `{}` at {}:{}",
					node.source, self.template, node.position
				));
				out.push_str(&format!("{{{{ {} }}}}", node.source));
			}
		}

		Ok(())
	}

	/// Render block `name` using its definition at `level` of the inheritance
	/// chain, falling back to `body` for blocks outside the resolved chain.
	fn render_block(
		&mut self,
		name: &str,
		level: usize,
		body: &[Node],
		context: &mut RenderContext,
		out: &mut String,
	) -> JinjacResult<()> {
		let definition = self
			.resolved
			.as_ref()
			.and_then(|resolved| resolved.block_definition(name, level))
			.cloned();

		let previous_template = match &definition {
			Some(definition) => Some(std::mem::replace(&mut self.template, Arc::from(definition.template.as_str()))),
			None => None,
		};
		self.blocks.push(ActiveBlock {
			name: name.to_string(),
			level,
		});
		context.push_scope();

		let nodes = definition.as_ref().map_or(body, |definition| definition.block.body.as_slice());
		let result = self.render_nodes(nodes, context, out);

		context.pop_scope();
		self.blocks.pop();
		if let Some(previous) = previous_template {
			self.template = previous;
		}
		result
	}

	fn render_include(&mut self, node: &IncludeNode, context: &mut RenderContext, out: &mut String) -> JinjacResult<()> {
		let target = self.evaluator(node.position).eval(&node.target, context, self)?;
		let candidates = match target {
			Value::List(items) => items.iter().map(ToString::to_string).collect(),
			other => vec![other.to_string()],
		};

		let Some(path) = candidates.iter().find(|path| self.cache.loader().exists(path)).cloned() else {
			let name = candidates.join(", ");
			if node.ignore_missing {
				self.warn(format!("skipped missing include `{name}`"));
				return Ok(());
			}
			return Err(JinjacError::not_found(name, Some(self.template.as_ref())));
		};

		let resolved = InheritanceResolver::new(self.cache)
			.resolve(&path)
			.map_err(|error| error.located(&self.template, node.position))?;
		debug!(template = %self.template, include = %path, "rendering include");

		self.enter(node.position)?;
		let previous_autoescape = std::mem::replace(&mut self.autoescape, self.options.autoescape);
		let result = if node.with_context {
			context.push_scope();
			let result = self.render_resolved(Arc::new(resolved), context, out);
			context.pop_scope();
			result
		} else {
			self.render_resolved(Arc::new(resolved), &mut RenderContext::new(), out)
		};
		self.autoescape = previous_autoescape;
		self.leave();
		result
	}

	#[allow(clippy::too_many_arguments)]
	fn render_loop(
		&mut self,
		node: &ForNode,
		recursive: Option<Arc<ForNode>>,
		iterable: Value,
		depth: usize,
		context: &mut RenderContext,
		out: &mut String,
	) -> JinjacResult<()> {
		let evaluator = self.evaluator(node.position);
		let mut entries = loop_entries(&iterable, node.index_target.is_some());

		context.push_scope();
		if let Some(filter) = &node.filter {
			let mut kept = vec![];
			for (key, item) in entries {
				bind_targets(node, context, key.clone(), item.clone());
				if evaluator.eval(filter, context, self)?.is_truthy() {
					kept.push((key, item));
				}
			}
			entries = kept;
		}

		if entries.is_empty() {
			context.pop_scope();
			if let Some(else_body) = &node.else_body {
				return self.render_nodes(else_body, context, out);
			}
			return Ok(());
		}

		if let Some(node) = &recursive {
			self.loops.push(RecursiveLoop {
				node: Arc::clone(node),
				depth,
			});
		}

		let length = entries.len();
		let mut result = Ok(());
		for (index, (key, item)) in entries.iter().enumerate() {
			bind_targets(node, context, key.clone(), item.clone());
			context.set("loop", Value::Map(loop_context(&entries, index, length, depth)));

			result = self.render_nodes(&node.body, context, out);
			if result.is_err() {
				break;
			}
		}

		if recursive.is_some() {
			self.loops.pop();
		}
		context.pop_scope();
		result
	}

	fn render_set(&mut self, node: &SetNode, context: &mut RenderContext) -> JinjacResult<()> {
		let value = match &node.value {
			SetValue::Expr(expr) => self.evaluator(node.position).eval(expr, context, self)?,
			SetValue::Block(body) => {
				let mut captured = String::new();
				self.render_nodes(body, context, &mut captured)?;
				Value::safe(captured)
			}
		};

		match &node.target {
			SetTarget::Name(name) => context.set(name, value),
			SetTarget::Attribute(name, attribute) => {
				let Some(Value::Namespace(namespace)) = context.get(name) else {
					return Err(JinjacError::render(
						format!("cannot assign attribute '{attribute}' on '{name}', which is not a namespace"),
						&self.template,
						node.position,
					));
				};
				namespace.set(attribute, value);
			}
		}

		Ok(())
	}

	fn render_call_block(&mut self, node: &MacroCallNode, context: &mut RenderContext, out: &mut String) -> JinjacResult<()> {
		let Expr::Call { target, args, kwargs } = &node.call else {
			return Err(JinjacError::render("call block expects a macro call", &self.template, node.position));
		};

		let evaluator = self.evaluator(node.position);
		let callee = evaluator.eval(target, context, self)?;
		let (args, kwargs) = evaluator.eval_args(args, kwargs, context, self)?;

		let Value::Macro(reference) = &callee else {
			let name = target.dotted_name().unwrap_or_else(|| callee.type_name().to_string());
			return Err(JinjacError::render(
				format!("'{name}' is not a macro"),
				&self.template,
				node.position,
			));
		};

		let caller = self.macro_ref(Arc::clone(&node.caller), Some(Arc::new(context.clone())));
		let value = self.call_macro(reference, args, kwargs, Some(Value::Macro(Arc::new(caller))), context)?;
		self.write_value(&value, out);
		Ok(())
	}

	/// A reference to a macro defined in the current template.
	fn macro_ref(&self, def: Arc<MacroDef>, closure: Option<Arc<RenderContext>>) -> MacroRef {
		MacroRef {
			def,
			module: self.module_for(&self.template),
			template: self.template.to_string(),
			closure,
		}
	}

	fn module_for(&self, template: &str) -> Arc<MacroModule> {
		self.modules
			.get(&TemplateCache::key(template))
			.cloned()
			.unwrap_or_default()
	}

	/// Load the macros of the template named by `target`.
	fn import(&mut self, target: &Expr, position: Position, context: &RenderContext) -> JinjacResult<ImportedModule> {
		let path = self.evaluator(position).eval(target, context, self)?.to_string();
		let template = self
			.cache
			.get(&path)
			.map_err(|error| error.located(&self.template, position))?;

		let key = TemplateCache::key(&template.name);
		let module = match self.modules.get(&key) {
			Some(module) => Arc::clone(module),
			None => {
				let module = Arc::new(collect_macros(&template.nodes));
				self.modules.insert(key, Arc::clone(&module));
				module
			}
		};

		Ok(ImportedModule {
			template: template.name.clone(),
			module,
		})
	}
}

/// The macros of an imported template.
struct ImportedModule {
	template: String,
	module: Arc<MacroModule>,
}

impl std::ops::Deref for ImportedModule {
	type Target = MacroModule;

	fn deref(&self) -> &Self::Target {
		&self.module
	}
}

impl RenderHooks for Renderer<'_> {
	fn call_macro(
		&mut self,
		reference: &MacroRef,
		args: Vec<Value>,
		mut kwargs: ValueMap,
		caller: Option<Value>,
		context: &RenderContext,
	) -> JinjacResult<Value> {
		let def = Arc::clone(&reference.def);
		self.enter(def.position)?;

		let mut scope = match &reference.closure {
			Some(closure) => RenderContext::with_parent(Arc::clone(closure)),
			None => {
				let mut scope = RenderContext::new();
				for (name, sibling) in reference.module.iter() {
					let sibling = MacroRef {
						def: Arc::clone(sibling),
						module: Arc::clone(&reference.module),
						template: reference.template.clone(),
						closure: None,
					};
					scope.set(name, Value::Macro(Arc::new(sibling)));
				}
				scope
			}
		};

		let mut args = args.into_iter();
		for param in &def.params {
			let value = match args.next() {
				Some(value) => value,
				None => {
					let named = kwargs
						.keys()
						.find(|key| key.eq_ignore_ascii_case(&param.name))
						.cloned()
						.and_then(|key| kwargs.shift_remove(&key));
					match (named, &param.default) {
						(Some(value), _) => value,
						(None, Some(default)) => self.evaluator(def.position).eval(default, context, self)?,
						(None, None) => Value::Undefined,
					}
				}
			};
			scope.set(&param.name, value);
		}
		scope.set("varargs", Value::List(args.collect()));
		scope.set("kwargs", Value::Map(kwargs));
		if let Some(caller) = caller {
			scope.set("caller", caller);
		}

		let previous_template = std::mem::replace(&mut self.template, Arc::from(reference.template.as_str()));
		let mut output = String::new();
		let result = self.render_nodes(&def.body, &mut scope, &mut output);
		self.template = previous_template;
		self.leave();
		result?;

		Ok(Value::safe(output))
	}

	fn render_super(&mut self, context: &RenderContext, position: Position) -> JinjacResult<Value> {
		let Some(active) = self.blocks.last().cloned() else {
			return Err(JinjacError::render(
				"super() can only be called inside a block",
				&self.template,
				position,
			));
		};

		let has_parent = self
			.resolved
			.as_ref()
			.is_some_and(|resolved| resolved.block_definition(&active.name, active.level + 1).is_some());
		if !has_parent {
			return Err(JinjacError::UndefinedBlock {
				name: active.name,
				template: self.template.to_string(),
			});
		}

		self.enter(position)?;
		let mut scope = context.clone();
		let mut output = String::new();
		let result = self.render_block(&active.name, active.level + 1, &[], &mut scope, &mut output);
		self.leave();
		result?;

		Ok(Value::safe(output))
	}

	fn recurse_loop(&mut self, items: Value, context: &RenderContext, position: Position) -> JinjacResult<Value> {
		let Some(active) = self.loops.last().cloned() else {
			return Err(JinjacError::render(
				"loop() can only be called inside a recursive loop",
				&self.template,
				position,
			));
		};

		self.enter(active.node.position)?;
		let mut scope = context.clone();
		let mut output = String::new();
		let node = Arc::clone(&active.node);
		let result = self.render_loop(
			&node,
			Some(Arc::clone(&node)),
			items,
			active.depth + 1,
			&mut scope,
			&mut output,
		);
		self.leave();
		result?;

		Ok(Value::safe(output))
	}

	fn record_asset(&mut self, path: &str) {
		let path = path.to_string();
		if !self.assets.contains(&path) {
			self.assets.push(path);
		}
	}
}

/// Split an iterable into `(key, item)` pairs. With two loop targets, maps
/// yield key and value, two-item lists unpack and other items pair with their
/// index.
fn loop_entries(iterable: &Value, unpack: bool) -> Vec<(Value, Value)> {
	match iterable {
		Value::Map(map) => {
			map.iter()
				.map(|(key, value)| {
					let key = Value::String(key.clone());
					if unpack { (key, value.clone()) } else { (Value::Undefined, key) }
				})
				.collect()
		}
		Value::Namespace(namespace) => loop_entries(&Value::Map(namespace.snapshot()), unpack),
		other => {
			other
				.to_items()
				.unwrap_or_default()
				.into_iter()
				.enumerate()
				.map(|(index, item)| {
					match item {
						Value::List(pair) if unpack && pair.len() == 2 => (pair[0].clone(), pair[1].clone()),
						item => (Value::from(index), item),
					}
				})
				.collect()
		}
	}
}

fn bind_targets(node: &ForNode, context: &mut RenderContext, key: Value, item: Value) {
	if let Some(index_target) = &node.index_target {
		context.set(index_target, key);
	}
	context.set(&node.target, item);
}

fn loop_context(entries: &[(Value, Value)], index: usize, length: usize, depth: usize) -> ValueMap {
	let mut context = ValueMap::new();
	context.insert("index".to_string(), Value::from(index + 1));
	context.insert("index0".to_string(), Value::from(index));
	context.insert("revindex".to_string(), Value::from(length - index));
	context.insert("revindex0".to_string(), Value::from(length - index - 1));
	context.insert("first".to_string(), Value::Bool(index == 0));
	context.insert("last".to_string(), Value::Bool(index + 1 == length));
	context.insert("length".to_string(), Value::from(length));
	context.insert("depth".to_string(), Value::from(depth + 1));
	context.insert("depth0".to_string(), Value::from(depth));
	context.insert(
		"previtem".to_string(),
		index
			.checked_sub(1)
			.and_then(|previous| entries.get(previous))
			.map(|(_, item)| item.clone())
			.unwrap_or_default(),
	);
	context.insert(
		"nextitem".to_string(),
		entries
			.get(index + 1)
			.map(|(_, item)| item.clone())
			.unwrap_or_default(),
	);
	context
}
