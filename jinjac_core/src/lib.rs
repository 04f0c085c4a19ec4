//! `jinjac_core` is the engine behind [jinjac](https://github.com/ifiokjr/jinjac), a compiler for Jinja-style templates. It turns template text and a data context into HTML with a hand-written lexer, a recursive-descent parser and a tree-walking renderer. No template library or parser generator is involved.
//!
//! ## Processing Pipeline
//!
//! ```text
//! Template source
//!   → Lexer (text, `{{ }}`, `{% %}`, `{# #}` and raw sections into tokens)
//!   → Parser (tokens into a Template of nodes and expression trees)
//!   → TemplateCache (parsed templates memoized by normalized path)
//!   → InheritanceResolver (folds the `extends` chain, merging block overrides)
//!   → Renderer (walks the nodes with a scoped RenderContext)
//!       ↳ Evaluator (expressions, tests, built-in functions and methods)
//!       ↳ FilterRegistry (`value|filter(args)` transformers)
//! ```
//!
//! ## Modules
//!
//! - [`ast`]: The template node and expression types produced by the parser.
//! - [`lexer`]: The state machine tokenizer and its whitespace options.
//! - [`config`]: Loading `jinjac.toml` and JSON, TOML or YAML data files.
//!
//! ## Key Types
//!
//! - [`Engine`]: Owns the loader, cache, filters and options. Built with [`Engine::builder`].
//! - [`RenderContext`]: The case-insensitive scope stack a render reads and writes.
//! - [`Value`]: The dynamically typed values templates compute with.
//! - [`TemplateLoader`]: Where template source comes from: [`MemoryLoader`] or [`FileSystemLoader`].
//! - [`FilterRegistry`]: Built-in and custom filters.
//! - [`JinjacError`]: Every failure, with template names and positions.
//!
//! ## Quick Start
//!
//! ```rust
//! use jinjac_core::Engine;
//! use serde_json::json;
//!
//! let engine = Engine::builder()
//! 	.templates([
//! 		("base.html", "<title>{% block title %}Site{% endblock %}</title>"),
//! 		("page.html", "{% extends \"base.html\" %}{% block title %}{{ name }} | {{ super() }}{% endblock %}"),
//! 	])
//! 	.build()?;
//!
//! let html = engine.render_json("page.html", json!({ "name": "Home" }))?;
//! assert_eq!(html, "<title>Home | Site</title>");
//! # Ok::<(), jinjac_core::JinjacError>(())
//! ```

pub use cache::*;
pub use config::*;
pub use context::*;
pub use engine::*;
pub use error::*;
pub use evaluator::*;
pub use filters::*;
pub use loader::*;
pub use parser::*;
pub use position::*;
pub use renderer::*;
pub use resolver::*;
pub use testers::*;
pub use value::*;

pub mod ast;
mod cache;
pub mod config;
mod context;
mod engine;
#[allow(unused_assignments)]
mod error;
mod evaluator;
mod expression;
mod filters;
pub mod lexer;
mod loader;
mod parser;
mod position;
mod renderer;
mod resolver;
mod testers;
pub mod tokens;
mod value;

#[cfg(test)]
mod __fixtures;
#[cfg(test)]
mod __tests;
