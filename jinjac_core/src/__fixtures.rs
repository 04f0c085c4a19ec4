use serde_json::json;

use crate::Engine;
use crate::JinjacResult;
use crate::MissingVariableBehavior;
use crate::RenderContext;

/// Render `source` as a string template against `data`.
pub fn render(source: &str, data: serde_json::Value) -> JinjacResult<String> {
	let engine = Engine::builder().build()?;
	engine.render_str(source, &RenderContext::from_json(data))
}

/// An in-memory engine serving `templates`.
pub fn engine_with(templates: &[(&str, &str)]) -> JinjacResult<Engine> {
	Engine::builder().templates(templates.iter().copied()).build()
}

pub fn strict_engine(templates: &[(&str, &str)]) -> JinjacResult<Engine> {
	Engine::builder()
		.templates(templates.iter().copied())
		.missing_variable(MissingVariableBehavior::ThrowException)
		.build()
}

/// A three level layout: `base.html` ← `section.html` ← `page.html`.
pub fn layout_templates() -> Vec<(&'static str, &'static str)> {
	vec![
		(
			"base.html",
			"<title>{% block title %}Site{% endblock %}</title><main>{% block body %}A{% endblock %}</main>",
		),
		(
			"section.html",
			"{% extends \"base.html\" %}{% block title %}Docs | {{ super() }}{% endblock %}",
		),
		(
			"page.html",
			"{% extends \"section.html\" %}{% block title %}Intro | {{ super() }}{% endblock %}{% block body %}B{% endblock %}",
		),
	]
}

pub fn macro_templates() -> Vec<(&'static str, &'static str)> {
	vec![
		(
			"_macros/forms.html",
			"{% macro greet(name, punctuation=\"!\") %}Hello {{ name }}{{ punctuation }}{% endmacro %}{% macro wrap(cls) %}<div class=\"{{ cls }}\">{{ caller() }}</div>{% endmacro %}{% macro shout(name) %}{{ greet(name|upper) }}{% endmacro %}",
		),
		(
			"from.html",
			"{% from \"_macros/forms.html\" import greet, shout as loud %}{{ greet(\"x\") }} {{ loud(\"y\") }}",
		),
		(
			"alias.html",
			"{% import \"_macros/forms.html\" as forms %}{{ forms.greet(\"x\", punctuation=\"?\") }}",
		),
		(
			"call.html",
			"{% from \"_macros/forms.html\" import wrap %}{% call wrap(\"box\") %}Hi {{ name }}{% endcall %}",
		),
	]
}

pub fn tree_data() -> serde_json::Value {
	json!({
		"tree": [
			{ "name": "a", "children": [
				{ "name": "b", "children": [] },
				{ "name": "c", "children": [] },
			]},
			{ "name": "d", "children": [] },
		]
	})
}

pub fn posts_data() -> serde_json::Value {
	json!({
		"posts": [
			{ "title": "Rust", "author": { "name": "Ann" }, "draft": false, "tag": "lang" },
			{ "title": "Jinja", "author": { "name": "Bob" }, "draft": true, "tag": "web" },
			{ "title": "Logos", "author": { "name": "Cy" }, "draft": false, "tag": "lang" },
		]
	})
}
