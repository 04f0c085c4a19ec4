use std::sync::Arc;

use crate::Position;
use crate::Value;

/// A parsed template: the root of the node tree.
#[derive(Debug, Clone, PartialEq)]
pub struct Template {
	pub name: String,
	pub nodes: Vec<Node>,
}

impl Template {
	/// The target of this template's `extends` tag, if any.
	pub fn extends(&self) -> Option<&ExtendsNode> {
		self.nodes.iter().find_map(|node| {
			match node {
				Node::Extends(extends) => Some(extends),
				_ => None,
			}
		})
	}
}

/// The closed set of template nodes.
#[derive(Debug, Clone, PartialEq)]
pub enum Node {
	Text(TextNode),
	Variable(VariableNode),
	Extends(ExtendsNode),
	Block(BlockNode),
	Include(IncludeNode),
	If(IfNode),
	For(ForNode),
	Set(SetNode),
	Macro(MacroNode),
	MacroCall(MacroCallNode),
	Import(ImportNode),
	FromImport(FromImportNode),
	Comment(CommentNode),
	Super(SuperNode),
	Raw(RawNode),
	With(WithNode),
	Autoescape(AutoescapeNode),
	FilterBlock(FilterBlockNode),
}

impl Node {
	pub fn position(&self) -> Position {
		match self {
			Node::Text(node) => node.position,
			Node::Variable(node) => node.position,
			Node::Extends(node) => node.position,
			Node::Block(node) => node.position,
			Node::Include(node) => node.position,
			Node::If(node) => node.position,
			Node::For(node) => node.position,
			Node::Set(node) => node.position,
			Node::Macro(node) => node.def.position,
			Node::MacroCall(node) => node.position,
			Node::Import(node) => node.position,
			Node::FromImport(node) => node.position,
			Node::Comment(node) => node.position,
			Node::Super(node) => node.position,
			Node::Raw(node) => node.position,
			Node::With(node) => node.position,
			Node::Autoescape(node) => node.position,
			Node::FilterBlock(node) => node.position,
		}
	}
}

#[derive(Debug, Clone, PartialEq)]
pub struct TextNode {
	pub text: String,
	pub position: Position,
}

/// `{{ expr|filter(args)... }}`
#[derive(Debug, Clone, PartialEq)]
pub struct VariableNode {
	pub expr: Expr,
	/// The expression as written, used by the placeholder missing-variable
	/// policy.
	pub source: String,
	pub filters: Vec<FilterCall>,
	pub position: Position,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ExtendsNode {
	pub path: String,
	pub position: Position,
}

#[derive(Debug, Clone, PartialEq)]
pub struct BlockNode {
	pub name: String,
	pub body: Vec<Node>,
	pub scoped: bool,
	pub position: Position,
}

#[derive(Debug, Clone, PartialEq)]
pub struct IncludeNode {
	pub target: Expr,
	pub ignore_missing: bool,
	pub with_context: bool,
	pub position: Position,
}

#[derive(Debug, Clone, PartialEq)]
pub struct IfNode {
	pub condition: Expr,
	pub body: Vec<Node>,
	pub elifs: Vec<ElifBranch>,
	pub else_body: Option<Vec<Node>>,
	pub position: Position,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ElifBranch {
	pub condition: Expr,
	pub body: Vec<Node>,
	pub position: Position,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ForNode {
	/// Name bound to each item, or to the value of a two-name loop.
	pub target: String,
	/// The first name of `for a, b in ...`, bound to the key or index.
	pub index_target: Option<String>,
	pub iterable: Expr,
	/// Inline `for x in xs if cond` filter.
	pub filter: Option<Expr>,
	pub body: Vec<Node>,
	pub else_body: Option<Vec<Node>>,
	pub recursive: bool,
	pub position: Position,
}

#[derive(Debug, Clone, PartialEq)]
pub enum SetTarget {
	Name(String),
	/// `set ns.attr = value` on a namespace object.
	Attribute(String, String),
}

#[derive(Debug, Clone, PartialEq)]
pub enum SetValue {
	Expr(Expr),
	/// `{% set name %}...{% endset %}` captures rendered output.
	Block(Vec<Node>),
}

#[derive(Debug, Clone, PartialEq)]
pub struct SetNode {
	pub target: SetTarget,
	pub value: SetValue,
	pub position: Position,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MacroParam {
	pub name: String,
	pub default: Option<Expr>,
}

/// A macro definition. Shared between the tree and every value that refers to
/// it.
#[derive(Debug, Clone, PartialEq)]
pub struct MacroDef {
	pub name: String,
	pub params: Vec<MacroParam>,
	pub body: Vec<Node>,
	pub position: Position,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MacroNode {
	pub def: Arc<MacroDef>,
}

/// `{% call(params) macro(args) %}body{% endcall %}`
#[derive(Debug, Clone, PartialEq)]
pub struct MacroCallNode {
	pub call: Expr,
	/// Parameters of the `caller` macro built from the body.
	pub caller: Arc<MacroDef>,
	pub position: Position,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ImportNode {
	pub target: Expr,
	pub alias: String,
	pub position: Position,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ImportName {
	pub name: String,
	pub alias: Option<String>,
}

impl ImportName {
	/// The name the import is bound to in the current scope.
	pub fn binding(&self) -> &str {
		self.alias.as_deref().unwrap_or(&self.name)
	}
}

#[derive(Debug, Clone, PartialEq)]
pub struct FromImportNode {
	pub target: Expr,
	pub names: Vec<ImportName>,
	pub position: Position,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CommentNode {
	pub text: String,
	pub position: Position,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SuperNode {
	pub position: Position,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RawNode {
	pub text: String,
	pub position: Position,
}

#[derive(Debug, Clone, PartialEq)]
pub struct WithNode {
	pub bindings: Vec<(String, Expr)>,
	pub body: Vec<Node>,
	pub position: Position,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AutoescapeNode {
	pub enabled: Expr,
	pub body: Vec<Node>,
	pub position: Position,
}

/// `{% filter upper %}...{% endfilter %}`
#[derive(Debug, Clone, PartialEq)]
pub struct FilterBlockNode {
	pub filters: Vec<FilterCall>,
	pub body: Vec<Node>,
	pub position: Position,
}

/// A filter applied with `|name(args)`.
#[derive(Debug, Clone, PartialEq)]
pub struct FilterCall {
	pub name: String,
	pub args: Vec<Expr>,
	pub kwargs: Vec<(String, Expr)>,
	pub position: Position,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
	Or,
	And,
	Eq,
	Ne,
	Lt,
	Le,
	Gt,
	Ge,
	In,
	NotIn,
	Add,
	Sub,
	Mul,
	Div,
	FloorDiv,
	Mod,
	Pow,
	Concat,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
	Not,
	Neg,
	Pos,
}

/// A parsed expression.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
	Literal(Value),
	Name(String),
	List(Vec<Expr>),
	Dict(Vec<(Expr, Expr)>),
	Attribute {
		target: Box<Expr>,
		name: String,
	},
	Index {
		target: Box<Expr>,
		index: Box<Expr>,
	},
	Call {
		target: Box<Expr>,
		args: Vec<Expr>,
		kwargs: Vec<(String, Expr)>,
	},
	Filter {
		target: Box<Expr>,
		filter: FilterCall,
	},
	Test {
		target: Box<Expr>,
		name: String,
		args: Vec<Expr>,
		negated: bool,
	},
	Unary {
		op: UnaryOp,
		operand: Box<Expr>,
	},
	Binary {
		op: BinaryOp,
		left: Box<Expr>,
		right: Box<Expr>,
	},
	Conditional {
		condition: Box<Expr>,
		then: Box<Expr>,
		otherwise: Option<Box<Expr>>,
	},
	Super,
}

impl Expr {
	/// The dotted name of a plain variable or attribute chain, e.g. `user.name`.
	pub fn dotted_name(&self) -> Option<String> {
		match self {
			Expr::Name(name) => Some(name.clone()),
			Expr::Attribute { target, name } => {
				target.dotted_name().map(|parent| format!("{parent}.{name}"))
			}
			_ => None,
		}
	}
}
