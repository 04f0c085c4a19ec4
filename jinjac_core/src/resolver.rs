use std::sync::Arc;

use indexmap::IndexMap;
use tracing::debug;

use crate::JinjacError;
use crate::JinjacResult;
use crate::TemplateCache;
use crate::ast::AutoescapeNode;
use crate::ast::BlockNode;
use crate::ast::FilterBlockNode;
use crate::ast::ForNode;
use crate::ast::IfNode;
use crate::ast::Node;
use crate::ast::Template;
use crate::ast::WithNode;
use crate::loader::normalize_path;
use crate::value::MacroModule;

/// One definition of a block, tagged with the template it came from.
#[derive(Debug, Clone, PartialEq)]
pub struct BlockDefinition {
	pub template: String,
	pub block: BlockNode,
}

/// A top-level statement of a child template that runs before the root
/// layout renders: imports, macro definitions and `set`.
#[derive(Debug, Clone, PartialEq)]
pub struct PreambleNode {
	pub template: String,
	pub node: Node,
}

/// A template with its inheritance chain folded into a single node tree.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedTemplate {
	/// The template that was requested.
	pub path: String,
	/// The template at the top of the chain, which provides the layout.
	pub root: String,
	/// The root's nodes with every overridden block replaced.
	pub nodes: Vec<Node>,
	/// Requested template first, root last.
	pub chain: Vec<String>,
	/// The winning definition of every block, keyed by lowercased name.
	pub blocks: IndexMap<String, BlockNode>,
	/// Every definition of each block, most derived first.
	pub block_chain: IndexMap<String, Vec<BlockDefinition>>,
	pub preamble: Vec<PreambleNode>,
	/// Macros defined by each template of the chain, keyed by cache key.
	pub modules: IndexMap<String, Arc<MacroModule>>,
}

impl ResolvedTemplate {
	/// The definition of block `name` at `level`, where level 0 is the most
	/// derived template.
	pub fn block_definition(&self, name: &str, level: usize) -> Option<&BlockDefinition> {
		self.block_chain
			.get(&name.to_lowercase())
			.and_then(|definitions| definitions.get(level))
	}

	pub fn is_extended(&self) -> bool {
		self.chain.len() > 1
	}
}

/// Follows `extends` chains through a [`TemplateCache`].
#[derive(Debug, Clone, Copy)]
pub struct InheritanceResolver<'a> {
	cache: &'a TemplateCache,
}

impl<'a> InheritanceResolver<'a> {
	pub fn new(cache: &'a TemplateCache) -> Self {
		Self { cache }
	}

	/// Load and resolve the template at `path`.
	pub fn resolve(&self, path: &str) -> JinjacResult<ResolvedTemplate> {
		let template = self.cache.get(path)?;
		self.resolve_template(template)
	}

	/// Resolve an already parsed template. Parents are loaded from the cache.
	pub fn resolve_template(&self, template: Arc<Template>) -> JinjacResult<ResolvedTemplate> {
		let path = template.name.clone();
		let mut chain = vec![path.clone()];
		let mut seen = vec![TemplateCache::key(&path)];
		let mut templates = vec![];
		let mut current = template;

		loop {
			let parent = current
				.extends()
				.map(|extends| (extends.path.clone(), extends.position));
			templates.push(Arc::clone(&current));

			let Some((parent_path, position)) = parent else {
				break;
			};

			chain.push(normalize_path(&parent_path));
			let key = TemplateCache::key(&parent_path);
			if seen.contains(&key) {
				return Err(JinjacError::CircularInheritance { chain });
			}
			seen.push(key);

			current = self
				.cache
				.get(&parent_path)
				.map_err(|error| error.located(&current.name, position))?;
		}

		debug!(template = %path, chain = %chain.join(" -> "), "resolved inheritance chain");

		let mut blocks: IndexMap<String, BlockNode> = IndexMap::new();
		let mut block_chain: IndexMap<String, Vec<BlockDefinition>> = IndexMap::new();
		for template in &templates {
			let mut definitions = vec![];
			collect_blocks(&template.nodes, &mut definitions);

			for block in definitions {
				let key = block.name.to_lowercase();
				blocks.entry(key.clone()).or_insert_with(|| block.clone());
				block_chain.entry(key).or_default().push(BlockDefinition {
					template: template.name.clone(),
					block,
				});
			}
		}

		let preamble = templates
			.iter()
			.take(templates.len().saturating_sub(1))
			.flat_map(|template| {
				template
					.nodes
					.iter()
					.filter(|node| {
						matches!(
							node,
							Node::Import(_) | Node::FromImport(_) | Node::Macro(_) | Node::Set(_)
						)
					})
					.map(|node| {
						PreambleNode {
							template: template.name.clone(),
							node: node.clone(),
						}
					})
			})
			.collect();

		let modules = templates
			.iter()
			.map(|template| {
				(
					TemplateCache::key(&template.name),
					Arc::new(collect_macros(&template.nodes)),
				)
			})
			.collect();

		let root = templates.last().map_or_else(|| path.clone(), |root| root.name.clone());
		let nodes = templates
			.last()
			.map(|root| substitute(&root.nodes, &blocks, &mut vec![]))
			.unwrap_or_default();

		Ok(ResolvedTemplate {
			path,
			root,
			nodes,
			chain,
			blocks,
			block_chain,
			preamble,
			modules,
		})
	}
}

/// Collect every block in `nodes`, outer blocks before the blocks nested in
/// them.
fn collect_blocks(nodes: &[Node], blocks: &mut Vec<BlockNode>) {
	for node in nodes {
		if let Node::Block(block) = node {
			blocks.push(block.clone());
		}
		for children in child_lists(node) {
			collect_blocks(children, blocks);
		}
	}
}

/// Every macro defined in `nodes`, including macros nested in blocks.
pub(crate) fn collect_macros(nodes: &[Node]) -> MacroModule {
	let mut module = MacroModule::new();
	gather_macros(nodes, &mut module);
	module
}

fn gather_macros(nodes: &[Node], module: &mut MacroModule) {
	for node in nodes {
		if let Node::Macro(node) = node {
			module.insert(node.def.name.to_lowercase(), Arc::clone(&node.def));
		}
		for children in child_lists(node) {
			gather_macros(children, module);
		}
	}
}

fn child_lists(node: &Node) -> Vec<&Vec<Node>> {
	match node {
		Node::Block(block) => vec![&block.body],
		Node::If(node) => {
			let mut lists = vec![&node.body];
			lists.extend(node.elifs.iter().map(|branch| &branch.body));
			lists.extend(node.else_body.as_ref());
			lists
		}
		Node::For(node) => {
			let mut lists = vec![&node.body];
			lists.extend(node.else_body.as_ref());
			lists
		}
		Node::With(node) => vec![&node.body],
		Node::Autoescape(node) => vec![&node.body],
		Node::FilterBlock(node) => vec![&node.body],
		_ => vec![],
	}
}

/// Rebuild `nodes` replacing each block body with the body of its winning
/// definition. `active` holds the blocks being expanded so a block nested in
/// itself is left as written.
fn substitute(nodes: &[Node], blocks: &IndexMap<String, BlockNode>, active: &mut Vec<String>) -> Vec<Node> {
	nodes
		.iter()
		.filter(|node| !matches!(node, Node::Extends(_)))
		.map(|node| substitute_node(node, blocks, active))
		.collect()
}

fn substitute_node(node: &Node, blocks: &IndexMap<String, BlockNode>, active: &mut Vec<String>) -> Node {
	match node {
		Node::Block(block) => {
			let key = block.name.to_lowercase();
			if active.contains(&key) {
				return node.clone();
			}

			let winner = blocks.get(&key).unwrap_or(block);
			active.push(key);
			let body = substitute(&winner.body, blocks, active);
			active.pop();

			Node::Block(BlockNode {
				name: block.name.clone(),
				body,
				scoped: winner.scoped,
				position: block.position,
			})
		}
		Node::If(node) => {
			let mut node: IfNode = node.clone();
			node.body = substitute(&node.body, blocks, active);
			for branch in &mut node.elifs {
				branch.body = substitute(&branch.body, blocks, active);
			}
			if let Some(else_body) = &node.else_body {
				node.else_body = Some(substitute(else_body, blocks, active));
			}
			Node::If(node)
		}
		Node::For(node) => {
			let mut node: ForNode = node.clone();
			node.body = substitute(&node.body, blocks, active);
			if let Some(else_body) = &node.else_body {
				node.else_body = Some(substitute(else_body, blocks, active));
			}
			Node::For(node)
		}
		Node::With(node) => {
			Node::With(WithNode {
				body: substitute(&node.body, blocks, active),
				..node.clone()
			})
		}
		Node::Autoescape(node) => {
			Node::Autoescape(AutoescapeNode {
				body: substitute(&node.body, blocks, active),
				..node.clone()
			})
		}
		Node::FilterBlock(node) => {
			Node::FilterBlock(FilterBlockNode {
				body: substitute(&node.body, blocks, active),
				..node.clone()
			})
		}
		other => other.clone(),
	}
}
