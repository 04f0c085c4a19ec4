use miette::Diagnostic;
use thiserror::Error;

use crate::Position;

#[derive(Debug, Diagnostic, Error)]
#[non_exhaustive]
pub enum JinjacError {
	#[error(transparent)]
	#[diagnostic(code(jinjac::io_error))]
	Io(#[from] std::io::Error),

	#[error("template not found: `{name}`{}", .referenced_from.as_ref().map(|from| format!(" (referenced from `{from}`)")).unwrap_or_default())]
	#[diagnostic(
		code(jinjac::template_not_found),
		help("check the template path, or use `ignore missing` on includes that are optional")
	)]
	TemplateNotFound {
		name: String,
		referenced_from: Option<String>,
	},

	#[error("circular template inheritance: {}", .chain.join(" -> "))]
	#[diagnostic(
		code(jinjac::circular_inheritance),
		help("remove one of the `extends` tags so the chain ends at a root template")
	)]
	CircularInheritance { chain: Vec<String> },

	#[error("[{template}:{line}:{column}] {message}")]
	#[diagnostic(code(jinjac::template_parse))]
	TemplateParse {
		message: String,
		template: String,
		line: usize,
		column: usize,
		token: String,
	},

	#[error("[{template}:{line}:{column}] undefined variable: `{name}`")]
	#[diagnostic(
		code(jinjac::missing_variable),
		help("provide `{name}` in the render data or guard it with `is defined`")
	)]
	MissingVariable {
		name: String,
		template: String,
		line: usize,
		column: usize,
	},

	#[error("[{template}] undefined block: `{name}`")]
	#[diagnostic(
		code(jinjac::undefined_block),
		help("`super()` needs a block with the same name in a parent template")
	)]
	UndefinedBlock { name: String, template: String },

	#[error("[{template}:{line}:{column}] Filter '{name}' failed: {reason}")]
	#[diagnostic(code(jinjac::filter_failed))]
	FilterFailed {
		name: String,
		reason: String,
		template: String,
		line: usize,
		column: usize,
	},

	#[error("[{template}:{line}:{column}] {message}")]
	#[diagnostic(code(jinjac::render))]
	Render {
		message: String,
		template: String,
		line: usize,
		column: usize,
	},

	#[error("failed to parse config file: {0}")]
	#[diagnostic(
		code(jinjac::config_parse),
		help("check that jinjac.toml is valid TOML with [templates], [output], [render] and [data] sections")
	)]
	ConfigParse(String),

	#[error("failed to load data file `{path}`: {reason}")]
	#[diagnostic(code(jinjac::data_file))]
	DataFile { path: String, reason: String },

	#[error("unsupported data file format: `{0}`")]
	#[diagnostic(
		code(jinjac::unsupported_format),
		help("supported formats: json, toml, yaml, yml")
	)]
	UnsupportedDataFormat(String),
}

impl JinjacError {
	pub(crate) fn parse(
		message: impl Into<String>,
		template: &str,
		position: Position,
		token: impl Into<String>,
	) -> Self {
		Self::TemplateParse {
			message: message.into(),
			template: template.to_string(),
			line: position.line,
			column: position.column,
			token: token.into(),
		}
	}

	pub(crate) fn render(message: impl Into<String>, template: &str, position: Position) -> Self {
		Self::Render {
			message: message.into(),
			template: template.to_string(),
			line: position.line,
			column: position.column,
		}
	}

	pub(crate) fn not_found(name: impl Into<String>, referenced_from: Option<&str>) -> Self {
		Self::TemplateNotFound {
			name: name.into(),
			referenced_from: referenced_from.map(ToString::to_string),
		}
	}

	/// Attach the template and position to errors raised without them, such as
	/// filter failures coming out of the registry.
	pub(crate) fn located(self, template: &str, position: Position) -> Self {
		match self {
			Self::FilterFailed {
				name,
				reason,
				template: current,
				line,
				column,
			} => {
				if current.is_empty() {
					Self::FilterFailed {
						name,
						reason,
						template: template.to_string(),
						line: position.line,
						column: position.column,
					}
				} else {
					Self::FilterFailed {
						name,
						reason,
						template: current,
						line,
						column,
					}
				}
			}
			Self::TemplateNotFound {
				name,
				referenced_from: None,
			} => {
				Self::TemplateNotFound {
					name,
					referenced_from: Some(template.to_string()),
				}
			}
			other => other,
		}
	}
}

pub type JinjacResult<T> = Result<T, JinjacError>;
pub type AnyError = Box<dyn std::error::Error>;
pub type AnyEmptyResult = Result<(), AnyError>;
pub type AnyResult<T> = Result<T, AnyError>;
