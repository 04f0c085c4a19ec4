use std::sync::Arc;

use rstest::rstest;
use serde_json::json;
use similar_asserts::assert_eq;
use tracing_test::traced_test;

use super::__fixtures::*;
use super::*;
use crate::lexer::LexerOptions;
use crate::lexer::tokenize;
use crate::lexer::tokenize_expression;
use crate::lexer::tokenize_with;
use crate::tokens::Token;
use crate::tokens::TokenKind;

fn kinds(tokens: impl IntoIterator<Item = Token>) -> Vec<TokenKind> {
	tokens.into_iter().map(|token| token.kind).collect()
}

#[rstest]
#[case::text_and_variable("Hi {{ name }}", vec![TokenKind::Text, TokenKind::VariableStart, TokenKind::Name, TokenKind::VariableEnd, TokenKind::Eof])]
#[case::statement("{% if x %}y{% endif %}", vec![TokenKind::StatementStart, TokenKind::Name, TokenKind::Name, TokenKind::StatementEnd, TokenKind::Text, TokenKind::StatementStart, TokenKind::Name, TokenKind::StatementEnd, TokenKind::Eof])]
#[case::comment("{# hi #}", vec![TokenKind::CommentStart, TokenKind::Text, TokenKind::CommentEnd, TokenKind::Eof])]
#[case::raw_block("{% raw %}{{ x }}{% endraw %}", vec![TokenKind::StatementStart, TokenKind::Name, TokenKind::StatementEnd, TokenKind::Text, TokenKind::StatementStart, TokenKind::Name, TokenKind::StatementEnd, TokenKind::Eof])]
#[case::empty("", vec![TokenKind::Eof])]
#[case::lone_brace("a { b }", vec![TokenKind::Text, TokenKind::Eof])]
fn tokenize_templates(#[case] source: &str, #[case] expected: Vec<TokenKind>) {
	assert_eq!(kinds(tokenize(source)), expected);
}

#[rstest]
#[case::operators("a // b ** 2 != 3", vec![TokenKind::Name, TokenKind::FloorDiv, TokenKind::Name, TokenKind::Pow, TokenKind::Integer, TokenKind::Ne, TokenKind::Integer, TokenKind::Eof])]
#[case::filter_call("x|join(', ')", vec![TokenKind::Name, TokenKind::Pipe, TokenKind::Name, TokenKind::LeftParen, TokenKind::String, TokenKind::RightParen, TokenKind::Eof])]
#[case::super_call("super()", vec![TokenKind::Super, TokenKind::Eof])]
#[case::float("1.5 + 2", vec![TokenKind::Float, TokenKind::Add, TokenKind::Integer, TokenKind::Eof])]
fn tokenize_expressions(#[case] source: &str, #[case] expected: Vec<TokenKind>) {
	assert_eq!(kinds(tokenize_expression(source)), expected);
}

#[test]
fn string_literals_resolve_escapes() {
	let tokens: Vec<_> = tokenize_expression(r#""a\"b\n" 'it\'s'"#).collect();
	assert_eq!(tokens[0].text, "a\"b\n");
	assert_eq!(tokens[1].text, "it's");
}

#[test]
fn tokens_carry_positions() {
	let tokens: Vec<_> = tokenize("a\n{{ b }}").collect();
	let name = &tokens[2];
	assert_eq!(name.kind, TokenKind::Name);
	assert_eq!(name.position, Position::new(2, 4, 5));
}

#[test]
fn trim_markers_strip_surrounding_whitespace() {
	let tokens: Vec<_> = tokenize("a  \n {{- b -}} \n c").collect();
	let texts: Vec<&str> = tokens
		.iter()
		.filter(|token| token.kind == TokenKind::Text)
		.map(|token| token.text.as_str())
		.collect();
	assert_eq!(texts, vec!["a", "c"]);
}

#[test]
fn lexer_options_trim_and_lstrip_blocks() {
	let options = LexerOptions {
		trim_blocks: true,
		lstrip_blocks: true,
	};
	let tokens: Vec<_> = tokenize_with("  {% if x %}\nyes\n", options).collect();
	let texts: Vec<&str> = tokens
		.iter()
		.filter(|token| token.kind == TokenKind::Text)
		.map(|token| token.text.as_str())
		.collect();
	assert_eq!(texts, vec!["yes\n"]);
}

#[test]
fn parse_builds_node_tree() -> JinjacResult<()> {
	let template = parse_source(
		"{% extends \"base.html\" %}{% block body scoped %}{% for a, b in items if b recursive %}{{ b|upper }}{% else %}-{% endfor %}{% endblock %}",
		"page.html",
		LexerOptions::default(),
	)?;

	assert_eq!(template.name, "page.html");
	assert_eq!(template.extends().map(|extends| extends.path.as_str()), Some("base.html"));

	let ast::Node::Block(block) = &template.nodes[1] else {
		panic!("expected a block node, got {:?}", template.nodes[1]);
	};
	assert!(block.scoped);
	assert_eq!(block.name, "body");

	let ast::Node::For(node) = &block.body[0] else {
		panic!("expected a for node, got {:?}", block.body[0]);
	};
	assert_eq!(node.index_target.as_deref(), Some("a"));
	assert_eq!(node.target, "b");
	assert!(node.recursive);
	assert!(node.filter.is_some());
	assert!(node.else_body.is_some());

	Ok(())
}

#[test]
fn variable_nodes_keep_their_source_and_filters() -> JinjacResult<()> {
	let template = parse_source("{{ user.name|default('x')|upper }}", "t.html", LexerOptions::default())?;
	let ast::Node::Variable(node) = &template.nodes[0] else {
		panic!("expected a variable node");
	};

	assert_eq!(node.source, "user.name");
	assert_eq!(
		node.filters
			.iter()
			.map(|filter| filter.name.as_str())
			.collect::<Vec<_>>(),
		vec!["default", "upper"]
	);

	Ok(())
}

#[test]
fn parse_expression_groups_subtraction_to_the_left() -> JinjacResult<()> {
	let expr = parse_expression("10 - 3 - 2")?;
	let ast::Expr::Binary { op, left, .. } = expr else {
		panic!("expected a binary expression");
	};
	assert_eq!(op, ast::BinaryOp::Sub);
	assert!(matches!(*left, ast::Expr::Binary { op: ast::BinaryOp::Sub, .. }));

	Ok(())
}

#[test]
fn parse_expression_splits_boolean_chains_at_and() -> JinjacResult<()> {
	let expr = parse_expression("a or b and not c")?;
	let ast::Expr::Binary { op, left, right } = expr else {
		panic!("expected a binary expression");
	};
	assert_eq!(op, ast::BinaryOp::And);
	assert!(matches!(*left, ast::Expr::Binary { op: ast::BinaryOp::Or, .. }));
	assert!(matches!(*right, ast::Expr::Unary { op: ast::UnaryOp::Not, .. }));

	Ok(())
}

#[rstest]
#[case::unclosed_if("{% if x %}open")]
#[case::unclosed_variable("{{ name ")]
#[case::bad_expression("{{ 1 + }}")]
#[case::extends_without_path("{% extends %}")]
#[case::set_without_name("{% set = 1 %}")]
fn parse_errors(#[case] source: &str) {
	let result = parse_source(source, "broken.html", LexerOptions::default());
	assert!(
		matches!(result, Err(JinjacError::TemplateParse { ref template, .. }) if template == "broken.html"),
		"unexpected result: {result:?}"
	);
}

#[test]
fn mismatched_block_names_fail() {
	let error = parse_source("{% block a %}x{% endblock b %}", "t.html", LexerOptions::default())
		.expect_err("mismatched endblock must fail");
	insta::assert_snapshot!(error.to_string(), @"[t.html:1:27] Expected 'endblock a', got 'endblock b'");
}

#[test]
fn unknown_statements_are_skipped() -> JinjacResult<()> {
	assert_eq!(render("a{% do something %}b", json!({}))?, "ab");
	Ok(())
}

#[rstest]
#[case::plain_substitution("Hello {{ name }}!", json!({ "name": "World" }), "Hello World!")]
#[case::no_tags("just text", json!({}), "just text")]
#[case::case_insensitive_names("{{ NAME }}", json!({ "name": "Ann" }), "Ann")]
#[case::attribute_and_index("{{ user.name }} {{ user[\"age\"] }} {{ items[-1] }}", json!({ "user": { "name": "Ann", "age": 30 }, "items": [1, 2, 3] }), "Ann 30 3")]
#[case::missing_attribute_chain("[{{ user.missing.deeper }}]", json!({ "user": {} }), "[]")]
#[case::lower_then_upper("{{ \"Hello\"|lower|upper }}", json!({}), "HELLO")]
#[case::upper("{{ \"Hello\"|upper }}", json!({}), "HELLO")]
#[case::left_assoc_subtraction("{{ 10 - 3 - 2 }}", json!({}), "5")]
#[case::multiplication_first("{{ 1 + 2 * 3 }}", json!({}), "7")]
#[case::right_assoc_power("{{ 2 ** 3 ** 2 }}", json!({}), "512")]
#[case::floor_division("{{ -7 // 2 }}", json!({}), "-4")]
#[case::modulo_sign("{{ -7 % 3 }}", json!({}), "2")]
#[case::true_division("{{ 7 / 2 }}", json!({}), "3.5")]
#[case::division_by_zero("{{ 1 / 0 }}", json!({}), "0")]
#[case::integral_float("{{ 2.0 * 3 }}", json!({}), "6")]
#[case::concat("{{ \"a\" ~ 1 ~ \"b\" }}", json!({}), "a1b")]
#[case::string_repeat("{{ \"ab\" * 2 }}", json!({}), "abab")]
#[case::string_plus_number("{{ \"x\" + 1 }}", json!({}), "x1")]
#[case::list_plus_list("{{ ([1] + [2])|join(\",\") }}", json!({}), "1,2")]
#[case::comparison("{{ 1 < 2 }}", json!({}), "True")]
#[case::not_in("{{ \"z\" not in \"abc\" }}", json!({}), "True")]
#[case::in_list("{{ 2 in [1, 2, 3] }}", json!({}), "True")]
#[case::boolean_short_circuit("{{ none or \"fallback\" }}", json!({}), "fallback")]
#[case::not_binds_to_its_operand("{{ not 1 == 2 }}", json!({}), "False")]
#[case::not_before_comparison("{{ not none == true }}", json!({}), "True")]
#[case::and_is_loosest("{{ true or false and false }}", json!({}), "False")]
#[case::or_inside_and("{{ false and true or true }}", json!({}), "False")]
#[case::inline_if("{{ \"yes\" if flag else \"no\" }}", json!({ "flag": false }), "no")]
#[case::inline_if_without_else("[{{ \"yes\" if flag }}]", json!({ "flag": false }), "[]")]
#[case::test_odd("{{ 3 is odd }}", json!({}), "True")]
#[case::negated_test("{{ none is not defined }}", json!({}), "False")]
#[case::test_with_argument("{{ 9 is divisibleby 3 }}", json!({}), "True")]
#[case::test_in_condition("{% if user is defined and user.admin %}admin{% endif %}", json!({ "user": { "admin": true } }), "admin")]
#[case::unknown_test("{{ 1 is shiny }}", json!({}), "False")]
#[case::string_methods("{{ \"Hello World\".lower() }} {{ \"a-b-c\".split(\"-\")|join(\" \") }}", json!({}), "hello world a b c")]
#[case::dict_items("{% for k, v in d.items() %}{{ k }}={{ v }} {% endfor %}", json!({ "d": { "x": 1 } }), "x=1 ")]
#[case::dict_get("{{ d.get(\"missing\", \"none\") }}", json!({ "d": {} }), "none")]
fn renders_expressions(
	#[case] source: &str,
	#[case] data: serde_json::Value,
	#[case] expected: &str,
) -> JinjacResult<()> {
	assert_eq!(render(source, data)?, expected);
	Ok(())
}

#[rstest]
#[case::default_on_missing("{{ missing|default(\"n/a\") }}", "n/a")]
#[case::default_boolean("{{ \"\"|default(\"empty\", true) }}", "empty")]
#[case::join("{{ [1, 2, 3]|join(\"-\") }}", "1-2-3")]
#[case::length("{{ \"hello\"|length }}", "5")]
#[case::count("{{ [1, 2]|count }}", "2")]
#[case::title("{{ \"hello world\"|title }}", "Hello World")]
#[case::capitalize("{{ \"hELLO\"|capitalize }}", "Hello")]
#[case::trim("{{ \"  x  \"|trim }}", "x")]
#[case::truncate("{{ \"hello world foo\"|truncate(9) }}", "hello...")]
#[case::replace("{{ \"a-b-c\"|replace(\"-\", \"+\") }}", "a+b+c")]
#[case::round("{{ 3.14159|round(2) }}", "3.14")]
#[case::round_floor("{{ 2.7|round(method=\"floor\") }}", "2")]
#[case::int("{{ \"42\"|int + 1 }}", "43")]
#[case::abs("{{ (-3)|abs }}", "3")]
#[case::filesizeformat("{{ 2048|filesizeformat }}", "2 KB")]
#[case::sort_reverse("{{ [3, 1, 2]|sort(reverse=true)|join(\",\") }}", "3,2,1")]
#[case::sort_case_insensitive("{{ [\"b\", \"A\", \"c\"]|sort|join }}", "Abc")]
#[case::unique("{{ [1, 2, 1, 3]|unique|join(\",\") }}", "1,2,3")]
#[case::reverse_string("{{ \"abc\"|reverse }}", "cba")]
#[case::first_last("{{ [1, 2, 3]|first }}{{ [1, 2, 3]|last }}", "13")]
#[case::sum("{{ [1, 2, 3]|sum }}", "6")]
#[case::max_min("{{ [4, 9, 2]|max }}{{ [4, 9, 2]|min }}", "92")]
#[case::map_filter_name("{{ [\"a\", \"b\"]|map(\"upper\")|join }}", "AB")]
#[case::select_test("{{ [1, 2, 3, 4]|select(\"odd\")|join(\",\") }}", "1,3")]
#[case::reject_test("{{ [1, 2, 3, 4]|reject(\"odd\")|join(\",\") }}", "2,4")]
#[case::batch("{% for row in [1, 2, 3]|batch(2, 0) %}{{ row|join }};{% endfor %}", "12;30;")]
#[case::slice("{% for column in [1, 2, 3]|slice(2) %}{{ column|join }};{% endfor %}", "12;3;")]
#[case::dictsort("{% for k, v in {\"b\": 1, \"a\": 2}|dictsort %}{{ k }}{{ v }}{% endfor %}", "a2b1")]
#[case::dictsort_by_value("{% for k, v in {\"b\": 1, \"a\": 2}|dictsort(by=\"value\") %}{{ k }}{% endfor %}", "ba")]
#[case::xmlattr("<a {{ {\"href\": \"/x\", \"title\": none}|xmlattr }}>", "<a href=\"/x\">")]
#[case::format("{{ \"%s has %d items\"|format(\"cart\", 3) }}", "cart has 3 items")]
#[case::format_padding("{{ \"%05.1f\"|format(3.14159) }}", "003.1")]
#[case::string_modulo("{{ \"%s-%s\" % [\"a\", \"b\"] }}", "a-b")]
#[case::tojson("{{ {\"a\": [1, \"<\"]}|tojson }}", r#"{"a":[1,"\u003c"]}"#)]
#[case::wordcount("{{ \"one two  three\"|wordcount }}", "3")]
#[case::center("[{{ \"ab\"|center(6) }}]", "[  ab  ]")]
#[case::indent("{{ \"a\\nb\"|indent(2) }}", "a\n  b")]
#[case::urlencode("{{ \"a b&c\"|urlencode }}", "a%20b%26c")]
#[case::striptags("{{ \"<p>Hello <b>there</b></p>\"|striptags }}", "Hello there")]
#[case::escape_then_safe("{{ \"<b>\"|e }}", "&lt;b&gt;")]
#[case::list_filter("{{ \"ab\"|list|join(\",\") }}", "a,b")]
#[case::unknown_filter_passes_through("{{ \"x\"|sparkle }}", "x")]
#[case::filter_names_ignore_case("{{ \"x\"|UPPER }}", "X")]
fn applies_filters(#[case] source: &str, #[case] expected: &str) -> JinjacResult<()> {
	assert_eq!(render(source, json!({}))?, expected);
	Ok(())
}

#[test]
fn filters_over_records() -> JinjacResult<()> {
	let titles = render(
		"{{ posts|rejectattr(\"draft\")|map(attribute=\"title\")|join(\", \") }}",
		posts_data(),
	)?;
	assert_eq!(titles, "Rust, Logos");

	let authors = render("{{ posts|map(attribute=\"author.name\")|join(\"/\") }}", posts_data())?;
	assert_eq!(authors, "Ann/Bob/Cy");

	let groups = render(
		"{% for group in posts|groupby(\"tag\") %}{{ group.grouper }}:{{ group.list|length }};{% endfor %}",
		posts_data(),
	)?;
	assert_eq!(groups, "lang:2;web:1;");

	let sorted = render("{{ posts|sort(attribute=\"title\")|map(attribute=\"title\")|join(\",\") }}", posts_data())?;
	assert_eq!(sorted, "Jinja,Logos,Rust");

	Ok(())
}

#[rstest]
#[case::escapes_by_default("{{ \"<b>\" }}", "&lt;b&gt;")]
#[case::safe_filter("{{ \"<b>\"|safe }}", "<b>")]
#[case::autoescape_block("{% autoescape false %}{{ \"<b>\" }}{% endautoescape %}{{ \"<i>\" }}", "<b>&lt;i&gt;")]
#[case::quotes("{{ \"'\\\"\" }}", "&#39;&quot;")]
fn escapes_output(#[case] source: &str, #[case] expected: &str) -> JinjacResult<()> {
	assert_eq!(render(source, json!({}))?, expected);
	Ok(())
}

#[test]
fn autoescape_can_be_disabled() -> JinjacResult<()> {
	let engine = Engine::builder().autoescape(false).build()?;
	assert_eq!(engine.render_str("{{ \"<b>\" }}", &RenderContext::new())?, "<b>");
	Ok(())
}

#[rstest]
#[case::loop_metadata("{% for i in [\"a\", \"b\", \"c\"] %}{{ loop.index }}{{ i }}{% if loop.first %}^{% endif %}{% if loop.last %}${% endif %}{% endfor %}", json!({}), "1a^2b3c$")]
#[case::empty_with_else("{% for item in items %}{{ item }}{% else %}No items{% endfor %}", json!({ "items": [] }), "No items")]
#[case::missing_iterable_with_else("{% for item in nothing %}{{ item }}{% else %}none{% endfor %}", json!({}), "none")]
#[case::last_only_at_end("{% for i in items %}{{ loop.index }}{% if loop.last %}!{% endif %}{% endfor %}", json!({ "items": ["a", "b", "c"] }), "123!")]
#[case::revindex("{% for i in [1, 2, 3] %}{{ loop.revindex0 }}{% endfor %}", json!({}), "210")]
#[case::previtem("{% for i in [1, 2, 3] %}{{ loop.previtem|default(\"-\") }}{% endfor %}", json!({}), "-12")]
#[case::nextitem("{% for i in [1, 2, 3] %}{{ loop.nextitem|default(\"-\") }}{% endfor %}", json!({}), "23-")]
#[case::inline_filter("{% for i in [1, 2, 3, 4] if i is even %}{{ i }}{{ loop.length }}{% endfor %}", json!({}), "2242")]
#[case::loop_cycle("{% for i in [1, 2, 3] %}{{ loop.cycle(\"odd\", \"even\") }} {% endfor %}", json!({}), "odd even odd ")]
#[case::index_and_item("{% for i, item in [\"a\", \"b\"] %}{{ i }}{{ item }}{% endfor %}", json!({}), "0a1b")]
#[case::key_value("{% for k, v in data %}{{ k }}={{ v }};{% endfor %}", json!({ "data": { "a": 1, "b": 2 } }), "a=1;b=2;")]
#[case::map_keys("{% for key in {\"a\": 1, \"b\": 2} %}{{ key }}{% endfor %}", json!({}), "ab")]
#[case::nested_depth("{% for a in [1] %}{% for b in [2] %}{{ loop.depth }}{% endfor %}{% endfor %}", json!({}), "1")]
#[case::range("{{ range(1, 10, 3)|join(\",\") }}", json!({}), "1,4,7")]
#[case::loop_variables_do_not_leak("{% for i in [1] %}{% set inner = 1 %}{% endfor %}[{{ i }}{{ inner }}]", json!({}), "[]")]
fn renders_loops(
	#[case] source: &str,
	#[case] data: serde_json::Value,
	#[case] expected: &str,
) -> JinjacResult<()> {
	assert_eq!(render(source, data)?, expected);
	Ok(())
}

#[test]
fn recursive_loops() -> JinjacResult<()> {
	let html = render(
		"{% for item in tree recursive %}[{{ item.name }}{{ loop.depth }}{{ loop(item.children) }}]{% endfor %}",
		tree_data(),
	)?;
	insta::assert_snapshot!(html, @"[a1[b2][c2]][d1]");
	Ok(())
}

#[rstest]
#[case::elif("{% if n > 5 %}big{% elif n > 2 %}mid{% else %}small{% endif %}", json!({ "n": 3 }), "mid")]
#[case::else_branch("{% if n > 5 %}big{% elif n > 2 %}mid{% else %}small{% endif %}", json!({ "n": 1 }), "small")]
#[case::set_expression("{% set total = price * 2 %}{{ total }}", json!({ "price": 4 }), "8")]
#[case::set_block("{% set greeting %}Hi {{ name }}{% endset %}{{ greeting|upper }}", json!({ "name": "Ann" }), "HI ANN")]
#[case::namespace("{% set ns = namespace(count=0) %}{% for i in [1, 2, 3] %}{% set ns.count = ns.count + i %}{% endfor %}{{ ns.count }}", json!({}), "6")]
#[case::with("{% with x = 1, y = 2 %}{{ x + y }}{% endwith %}[{{ x }}]", json!({}), "3[]")]
#[case::filter_block("{% filter upper %}hello {{ name }}{% endfilter %}", json!({ "name": "Ann" }), "HELLO ANN")]
#[case::raw("{% raw %}{{ not rendered }}{% endraw %}", json!({}), "{{ not rendered }}")]
#[case::comment("a{# note #}b", json!({}), "ab")]
#[case::joiner("{% set comma = joiner(\", \") %}{% for i in [1, 2, 3] %}{{ comma() }}{{ i }}{% endfor %}", json!({}), "1, 2, 3")]
#[case::cycler("{% set c = cycler(\"a\", \"b\") %}{{ c.next() }}{{ c.next() }}{{ c.next() }}{{ c.current }}", json!({}), "abab")]
#[case::dict_builtin("{{ dict(a=1)|tojson }}", json!({}), "{\"a\":1}")]
#[case::macro_in_same_template("{% macro m(a) %}<{{ a }}>{% endmacro %}{{ m(\"x\") }}", json!({}), "<x>")]
#[case::macro_varargs("{% macro m(a) %}{{ a }}{{ varargs|join(\",\") }}{% endmacro %}{{ m(1, 2, 3) }}", json!({}), "12,3")]
#[case::macro_kwargs("{% macro m() %}{{ kwargs.x }}{% endmacro %}{{ m(x=5) }}", json!({}), "5")]
#[case::macro_default_from_caller("{% macro m(a=fallback) %}{{ a }}{% endmacro %}{{ m() }}", json!({ "fallback": "f" }), "f")]
#[case::macro_does_not_see_globals("{% macro m() %}[{{ name }}]{% endmacro %}{{ m() }}", json!({ "name": "Ann" }), "[]")]
fn renders_statements(
	#[case] source: &str,
	#[case] data: serde_json::Value,
	#[case] expected: &str,
) -> JinjacResult<()> {
	assert_eq!(render(source, data)?, expected);
	Ok(())
}

#[test]
fn whitespace_markers() -> JinjacResult<()> {
	assert_eq!(render("{{ \"a\" -}}   \n  {{- \"b\" }}", json!({}))?, "ab");

	let html = render(
		"<ul>\n  {%- for i in [1, 2] %}\n  <li>{{ i }}</li>\n  {%- endfor %}\n</ul>",
		json!({}),
	)?;
	assert_eq!(html, "<ul>\n  <li>1</li>\n  <li>2</li>\n</ul>");

	Ok(())
}

#[test]
fn trim_and_lstrip_blocks() -> JinjacResult<()> {
	let engine = Engine::builder().trim_blocks(true).lstrip_blocks(true).build()?;
	let html = engine.render_str(
		"<div>\n    {% if true %}\n    yes\n    {% endif %}\n</div>",
		&RenderContext::new(),
	)?;
	assert_eq!(html, "<div>\n    yes\n</div>");

	Ok(())
}

#[test]
fn trailing_newline_option() -> JinjacResult<()> {
	let context = RenderContext::new();
	let keep = Engine::builder().build()?;
	assert_eq!(keep.render_str("Hello\n", &context)?, "Hello\n");

	let strip = Engine::builder().keep_trailing_newline(false).build()?;
	assert_eq!(strip.render_str("Hello\n", &context)?, "Hello");
	assert_eq!(strip.render_str("Hello\r\n", &context)?, "Hello");
	assert_eq!(strip.render_str("Hello\n\n", &context)?, "Hello\n");

	Ok(())
}

#[test]
fn child_block_replaces_parent_block() -> JinjacResult<()> {
	let engine = engine_with(&[
		("base.html", "<html>{% block body %}A{% endblock %}</html>"),
		("child.html", "{% extends \"base.html\" %}{% block body %}B{% endblock %}"),
		("super.html", "{% extends \"base.html\" %}{% block body %}{{ super() }}B{% endblock %}"),
	])?;

	assert_eq!(engine.render("child.html", &RenderContext::new())?, "<html>B</html>");
	assert_eq!(engine.render("super.html", &RenderContext::new())?, "<html>AB</html>");
	assert_eq!(engine.render("base.html", &RenderContext::new())?, "<html>A</html>");

	Ok(())
}

#[test]
fn super_walks_the_whole_chain() -> JinjacResult<()> {
	let engine = engine_with(&layout_templates())?;
	let context = RenderContext::new();

	insta::assert_snapshot!(
		engine.render("page.html", &context)?,
		@"<title>Intro | Docs | Site</title><main>B</main>"
	);
	insta::assert_snapshot!(
		engine.render("section.html", &context)?,
		@"<title>Docs | Site</title><main>A</main>"
	);

	Ok(())
}

#[test]
fn resolver_reports_chain_and_blocks() -> JinjacResult<()> {
	let engine = engine_with(&layout_templates())?;
	let resolved = engine.resolve("page.html")?;

	assert_eq!(resolved.chain, vec!["page.html", "section.html", "base.html"]);
	assert_eq!(resolved.root, "base.html");
	assert!(resolved.is_extended());
	assert_eq!(resolved.block_chain["title"].len(), 3);
	assert_eq!(resolved.block_chain["body"].len(), 2);
	assert_eq!(
		resolved
			.block_definition("TITLE", 2)
			.map(|definition| definition.template.as_str()),
		Some("base.html")
	);

	Ok(())
}

#[test]
fn circular_inheritance_is_detected() -> JinjacResult<()> {
	let engine = engine_with(&[
		("a.html", "{% extends \"b.html\" %}"),
		("b.html", "{% extends \"a.html\" %}"),
	])?;

	let error = engine
		.render("a.html", &RenderContext::new())
		.expect_err("circular chain must fail");
	let JinjacError::CircularInheritance { chain } = &error else {
		panic!("unexpected error: {error:?}");
	};
	assert_eq!(chain, &vec!["a.html", "b.html", "a.html"]);
	insta::assert_snapshot!(error.to_string(), @"circular template inheritance: a.html -> b.html -> a.html");

	Ok(())
}

#[test]
fn missing_parent_names_the_child() -> JinjacResult<()> {
	let engine = engine_with(&[("child.html", "{% extends \"missing.html\" %}")])?;
	let error = engine
		.render("child.html", &RenderContext::new())
		.expect_err("missing parent must fail");

	assert!(
		matches!(
			&error,
			JinjacError::TemplateNotFound { name, referenced_from: Some(from) }
				if name == "missing.html" && from == "child.html"
		),
		"unexpected error: {error:?}"
	);

	Ok(())
}

#[test]
fn child_preamble_runs_before_layout() -> JinjacResult<()> {
	let mut templates = macro_templates();
	templates.push(("base.html", "<main>{% block body %}{% endblock %}</main>"));
	templates.push((
		"child.html",
		"{% extends \"base.html\" %}{% from \"_macros/forms.html\" import greet %}{% set who = \"Ann\" %}{% block body %}{{ greet(who) }}{% endblock %}",
	));
	let engine = engine_with(&templates)?;

	assert_eq!(engine.render("child.html", &RenderContext::new())?, "<main>Hello Ann!</main>");

	Ok(())
}

#[test]
fn super_without_parent_block_fails() {
	let error = render("{% block a %}{{ super() }}{% endblock %}", json!({}))
		.expect_err("super() without a parent must fail");

	assert!(
		matches!(&error, JinjacError::UndefinedBlock { name, template } if name == "a" && template == "<string>"),
		"unexpected error: {error:?}"
	);
}

#[rstest]
#[case::from_import("from.html", "Hello x! Hello Y!")]
#[case::import_alias("alias.html", "Hello x?")]
#[case::call_block("call.html", "<div class=\"box\">Hi Ann</div>")]
fn renders_macros(#[case] path: &str, #[case] expected: &str) -> JinjacResult<()> {
	let engine = engine_with(&macro_templates())?;
	let html = engine.render_json(path, json!({ "name": "Ann" }))?;
	assert_eq!(html, expected);
	Ok(())
}

#[test]
fn imported_macro_matches_inlined_body() -> JinjacResult<()> {
	let engine = engine_with(&[
		("m.html", "{% macro greet(name) %}<b>{{ name }}</b>{% endmacro %}"),
		("imported.html", "{% from \"m.html\" import greet %}{{ greet(\"x\") }}"),
		("inlined.html", "{% set name = \"x\" %}<b>{{ name }}</b>"),
	])?;
	let context = RenderContext::new();

	assert_eq!(
		engine.render("imported.html", &context)?,
		engine.render("inlined.html", &context)?
	);

	Ok(())
}

#[test]
fn importing_unknown_macro_fails() -> JinjacResult<()> {
	let engine = engine_with(&[
		("m.html", "{% macro greet() %}{% endmacro %}"),
		("page.html", "{% from \"m.html\" import wave %}"),
	])?;

	let error = engine
		.render("page.html", &RenderContext::new())
		.expect_err("unknown macro must fail");
	assert!(matches!(error, JinjacError::Render { .. }), "unexpected error: {error:?}");

	Ok(())
}

fn include_engine() -> JinjacResult<Engine> {
	engine_with(&[
		("partial.html", "[{{ name }}]"),
		("with.html", "{% include \"partial.html\" %}"),
		("without.html", "{% include \"partial.html\" without context %}"),
		("optional.html", "a{% include \"nope.html\" ignore missing %}b"),
		("broken.html", "{% include \"nope.html\" %}"),
		("fallback.html", "{% include [\"nope.html\", \"partial.html\"] %}"),
		("loop.html", "{% for name in [\"x\", \"y\"] %}{% include \"partial.html\" %}{% endfor %}"),
	])
}

#[rstest]
#[case::with_context("with.html", "[Ann]")]
#[case::without_context("without.html", "[]")]
#[case::ignore_missing("optional.html", "ab")]
#[case::first_existing("fallback.html", "[Ann]")]
#[case::sees_loop_variables("loop.html", "[x][y]")]
fn renders_includes(#[case] path: &str, #[case] expected: &str) -> JinjacResult<()> {
	let engine = include_engine()?;
	assert_eq!(engine.render_json(path, json!({ "name": "Ann" }))?, expected);
	Ok(())
}

#[test]
fn missing_include_fails() -> JinjacResult<()> {
	let engine = include_engine()?;
	let error = engine
		.render("broken.html", &RenderContext::new())
		.expect_err("missing include must fail");

	assert!(
		matches!(
			&error,
			JinjacError::TemplateNotFound { name, referenced_from: Some(from) }
				if name == "nope.html" && from == "broken.html"
		),
		"unexpected error: {error:?}"
	);

	Ok(())
}

#[test]
#[traced_test]
fn ignored_include_is_reported() {
	let engine = include_engine().expect("engine builds");
	let output = engine
		.render_with_assets("optional.html", &RenderContext::new())
		.expect("optional include renders");

	assert_eq!(output.warnings, vec!["skipped missing include `nope.html`"]);
	assert!(logs_contain("skipped missing include"));
}

#[test]
fn missing_variable_behaviors() -> JinjacResult<()> {
	let templates = [("page.html", "[{{ user.name }}]")];
	let context = RenderContext::new();

	let empty = engine_with(&templates)?;
	assert_eq!(empty.render("page.html", &context)?, "[]");

	let undefined = Engine::builder()
		.templates(templates)
		.missing_variable(MissingVariableBehavior::Undefined)
		.build()?;
	assert_eq!(undefined.render("page.html", &context)?, "[undefined]");

	let placeholder = Engine::builder()
		.templates(templates)
		.missing_variable(MissingVariableBehavior::ShowPlaceholder)
		.build()?;
	let output = placeholder.render_with_assets("page.html", &context)?;
	assert_eq!(output.html, "[{{ user.name }}]");
	assert_eq!(output.warnings.len(), 1);
	assert!(output.warnings[0].contains("undefined variable `user.name`"));

	Ok(())
}

#[test]
fn strict_mode_raises_missing_variable() -> JinjacResult<()> {
	let engine = strict_engine(&[
		("strict.html", "[{{ missing }}]"),
		("guarded.html", "{{ missing|default(\"x\") }}{% if missing is defined %}!{% endif %}"),
		("null.html", "[{{ nothing }}]"),
	])?;
	let context = RenderContext::from_json(json!({ "nothing": null }));

	let error = engine
		.render("strict.html", &context)
		.expect_err("missing variable must fail");
	let JinjacError::MissingVariable {
		name,
		template,
		line,
		column,
	} = &error
	else {
		panic!("unexpected error: {error:?}");
	};
	assert_eq!(name, "missing");
	assert_eq!(template, "strict.html");
	assert_eq!((*line, *column), (1, 2));

	assert_eq!(engine.render("guarded.html", &context)?, "x");
	assert_eq!(engine.render("null.html", &context)?, "[]");

	Ok(())
}

#[test]
fn rendering_is_deterministic() -> JinjacResult<()> {
	let engine = engine_with(&[(
		"page.html",
		"{% set c = cycler(\"a\", \"b\") %}{% set j = joiner() %}{% for i in [1, 2, 3] %}{{ j() }}{{ c.next() }}{% endfor %}",
	)])?;
	let context = RenderContext::new();

	let first = engine.render("page.html", &context)?;
	let second = engine.render("page.html", &context)?;
	assert_eq!(first, "a, b, a");
	assert_eq!(first, second);

	Ok(())
}

#[test]
fn url_for_records_static_assets() -> JinjacResult<()> {
	let engine = Engine::builder()
		.templates([(
			"page.html",
			"<link href=\"{{ url_for('static', filename='css/site.css') }}\">{{ url_for('static', filename='css/site.css') }}",
		)])
		.static_prefix("/assets/")
		.build()?;

	let output = engine.render_with_assets("page.html", &RenderContext::new())?;
	assert_eq!(output.html, "<link href=\"/assets/css/site.css\">/assets/css/site.css");
	assert_eq!(output.assets, vec!["css/site.css"]);
	assert_eq!(output.template_path, "page.html");

	let error = engine
		.render_str("{{ url_for('index') }}", &RenderContext::new())
		.expect_err("only the static endpoint is supported");
	assert!(matches!(error, JinjacError::Render { .. }), "unexpected error: {error:?}");

	Ok(())
}

#[rstest]
#[case::not_callable("{{ name() }}")]
#[case::undefined_function("{{ nothing_here() }}")]
#[case::unsupported_operands("{{ missing + 1 }}")]
#[case::bad_namespace_assignment("{% set user.name = 1 %}")]
#[case::loop_outside_recursive_loop("{% for i in [1] %}{{ loop([]) }}{% endfor %}")]
fn render_errors(#[case] source: &str) {
	let result = render(source, json!({ "name": "x", "user": {} }));
	assert!(
		matches!(result, Err(JinjacError::Render { ref template, .. }) if template == "<string>"),
		"unexpected result: {result:?}"
	);
}

#[test]
fn unsupported_operands_message() {
	let error = render("{{ missing + 1 }}", json!({})).expect_err("must fail");
	insta::assert_snapshot!(error.to_string(), @"[<string>:1:1] unsupported operand types for +: 'undefined' and 'integer'");
}

#[test]
fn filter_failures_are_located() {
	let error = render("{{ [1, 2]|batch(0) }}", json!({})).expect_err("batch(0) must fail");
	let JinjacError::FilterFailed {
		name,
		reason,
		template,
		line,
		..
	} = &error
	else {
		panic!("unexpected error: {error:?}");
	};

	assert_eq!(name, "batch");
	assert_eq!(reason, "linecount must be positive");
	assert_eq!(template, "<string>");
	assert_eq!(*line, 1);
}

#[rstest]
#[case::near_the_largest_integer("{{ range(9223372036854775800, 9223372036854775807, 5)|join(\",\") }}", "9223372036854775800,9223372036854775805")]
#[case::descending("{{ range(5, 0, -2)|join(\",\") }}", "5,3,1")]
#[case::stop_before_start("[{{ range(5, 0)|join(\",\") }}]", "[]")]
fn range_bounds(#[case] source: &str, #[case] expected: &str) -> JinjacResult<()> {
	assert_eq!(render(source, json!({}))?, expected);
	Ok(())
}

#[test]
fn range_spanning_every_integer_is_rejected() {
	let error = render("{{ range(-9223372036854775807, 9223372036854775807) }}", json!({}))
		.expect_err("range is capped");
	assert!(
		matches!(&error, JinjacError::Render { message, .. } if message.ends_with("exceeds the limit of 100000")),
		"unexpected error: {error:?}"
	);
}

#[test]
fn oversized_string_repeat_fails() {
	let error = render("{{ \"ab\" * 9223372036854775807 }}", json!({})).expect_err("repeat is capped");
	insta::assert_snapshot!(error.to_string(), @"[<string>:1:1] count of 9223372036854775807 exceeds the limit of 100000");
}

#[rstest]
#[case::center("{{ \"x\"|center(9223372036854775807) }}", "center")]
#[case::indent("{{ \"ab\"|indent(9223372036854775807) }}", "indent")]
#[case::format("{{ \"%999999999d\"|format(1) }}", "format")]
#[case::batch_fill("{{ [1]|batch(9223372036854775807, 0) }}", "batch")]
#[case::slice("{{ [1]|slice(9223372036854775807) }}", "slice")]
fn oversized_padding_fails(#[case] source: &str, #[case] filter: &str) {
	let error = render(source, json!({})).expect_err("padding is capped");
	assert!(
		matches!(&error, JinjacError::FilterFailed { name, reason, .. } if name == filter && reason.contains("exceeds the limit of 100000")),
		"unexpected error: {error:?}"
	);
}

#[test]
fn lipsum_generates_placeholder_paragraphs() -> JinjacResult<()> {
	let engine = Engine::builder().build()?;
	let context = RenderContext::new();

	let plain = engine.render_str("{{ lipsum(2, false) }}", &context)?;
	let paragraphs: Vec<&str> = plain.split("\n\n").collect();
	assert_eq!(paragraphs.len(), 2);
	assert!(plain.starts_with("Lorem ipsum dolor sit amet"), "unexpected text: {plain}");
	assert!(paragraphs.iter().all(|paragraph| paragraph.ends_with('.')));
	assert!(!plain.contains('<'));

	let html = engine.evaluate("lipsum(1)", &context)?;
	assert!(
		matches!(&html, Value::Safe(text) if text.starts_with("<p>Lorem") && text.ends_with(".</p>")),
		"unexpected value: {html:?}"
	);
	let rendered = engine.render_str("{{ lipsum(1) }}", &context)?;
	assert!(rendered.starts_with("<p>Lorem"), "html paragraphs are not escaped: {rendered}");

	Ok(())
}

#[test]
fn super_outside_a_block_is_located() {
	let error = render("a\n{{ super() }}", json!({})).expect_err("super() needs a block");
	insta::assert_snapshot!(error.to_string(), @"[<string>:2:1] super() can only be called inside a block");
}

#[test]
fn loop_call_outside_a_recursive_loop_is_located() {
	let error = render("{% for i in [1] %}{{ loop([]) }}{% endfor %}", json!({})).expect_err("loop() needs a recursive loop");
	let JinjacError::Render { line, column, .. } = &error else {
		panic!("unexpected error: {error:?}");
	};
	assert_eq!((*line, *column), (1, 19));
}

#[test]
fn recursion_is_bounded() {
	let result = std::thread::Builder::new()
		.stack_size(64 * 1024 * 1024)
		.spawn(|| render("{% macro r() %}{{ r() }}{% endmacro %}{{ r() }}", json!({})))
		.expect("thread spawns")
		.join()
		.expect("thread completes");

	let error = result.expect_err("unbounded recursion must fail");
	assert!(
		error.to_string().contains("maximum render depth of 100 exceeded"),
		"unexpected error: {error}"
	);
}

#[test]
fn custom_filters() -> JinjacResult<()> {
	let engine = Engine::builder()
		.filter("shout", |value, args| {
			let marks = args.get(0, "marks").and_then(Value::as_i64).unwrap_or(1);
			Ok(Value::from(format!("{value}{}", "!".repeat(marks as usize))))
		})
		.filter("Upper", |value, _| Ok(Value::from(format!("<{value}>"))))
		.filter("fail", |_, _| Err("always fails".to_string()))
		.build()?;
	let context = RenderContext::new();

	assert_eq!(engine.render_str("{{ \"hi\"|shout(marks=3) }}", &context)?, "hi!!!");
	assert_eq!(engine.render_str("{{ \"hi\"|upper }}", &context)?, "&lt;hi&gt;");
	assert!(engine.filters().contains("SHOUT"));

	let error = engine
		.render_str("{{ 1|fail }}", &context)
		.expect_err("failing filter must fail");
	assert!(matches!(error, JinjacError::FilterFailed { ref reason, .. } if reason == "always fails"));

	Ok(())
}

#[test]
fn filter_registry_lookup() -> JinjacResult<()> {
	let mut registry = FilterRegistry::empty();
	assert!(!registry.contains("upper"));
	registry.register("double", |value, _| {
		value
			.as_i64()
			.map(|number| Value::Int(number * 2))
			.ok_or_else(|| "expected a number".to_string())
	});

	assert_eq!(registry.names(), vec!["double"]);
	assert_eq!(registry.apply("DOUBLE", &Value::Int(4), &FilterArgs::default())?, Value::Int(8));
	assert_eq!(
		registry.apply("missing", &Value::from("x"), &FilterArgs::default())?,
		Value::from("x")
	);
	assert!(FilterRegistry::new().contains("dictsort"));

	Ok(())
}

#[test]
fn evaluates_standalone_expressions() -> JinjacResult<()> {
	let engine = Engine::builder().build()?;
	let context = RenderContext::from_json(json!({
		"items": [1, 2, 3],
		"user": { "admin": true, "name": "ann" },
		"banned": false,
	}));

	assert_eq!(engine.evaluate("items|length > 2", &context)?, Value::Bool(true));
	assert_eq!(engine.evaluate("user.name|title", &context)?, Value::from("Ann"));
	assert_eq!(engine.evaluate("10 - 3 - 2", &context)?, Value::Int(5));
	assert!(engine.evaluate_condition("user.admin and not banned", &context)?);
	assert!(!engine.evaluate_condition("missing", &context)?);
	assert!(matches!(
		engine.evaluate("1 +", &context),
		Err(JinjacError::TemplateParse { .. })
	));

	Ok(())
}

#[test]
fn context_scopes() {
	let mut parent = RenderContext::new();
	parent.set("site", "docs");
	let mut context = RenderContext::with_parent(Arc::new(parent));
	context.set("Name", "outer");

	context.push_scope();
	context.set("name", "inner");
	assert_eq!(context.get("NAME"), Some(&Value::from("inner")));
	assert_eq!(context.depth(), 2);

	context.pop_scope();
	assert_eq!(context.get("name"), Some(&Value::from("outer")));
	context.pop_scope();
	assert_eq!(context.depth(), 1);

	assert_eq!(context.get("site"), Some(&Value::from("docs")));
	assert!(!context.contains("missing"));
	assert_eq!(context.flatten().len(), 2);
}

#[test]
fn context_from_json_keeps_integers() {
	let context = RenderContext::from_json(json!({ "int": 3, "float": 2.5, "big": 1e20, "list": [true] }));

	assert_eq!(context.get("int"), Some(&Value::Int(3)));
	assert_eq!(context.get("float"), Some(&Value::Float(2.5)));
	assert_eq!(context.get("big"), Some(&Value::Float(1e20)));
	assert_eq!(context.get("list"), Some(&Value::List(vec![Value::Bool(true)])));
	assert_eq!(RenderContext::from_json(json!([1, 2])).flatten().len(), 0);
}

#[rstest]
#[case::undefined(Value::Undefined, false)]
#[case::null(Value::Null, false)]
#[case::zero(Value::Int(0), false)]
#[case::zero_float(Value::Float(0.0), false)]
#[case::empty_string(Value::from(""), false)]
#[case::empty_list(Value::List(vec![]), false)]
#[case::text(Value::from("x"), true)]
#[case::number(Value::Int(-1), true)]
#[case::list(Value::List(vec![Value::Null]), true)]
fn truthiness(#[case] value: Value, #[case] expected: bool) {
	assert_eq!(value.is_truthy(), expected);
}

#[rstest]
#[case::integral(3.0, "3")]
#[case::fraction(3.25, "3.25")]
#[case::negative(-0.5, "-0.5")]
fn formats_floats(#[case] value: f64, #[case] expected: &str) {
	assert_eq!(format_float(value), expected);
}

#[test]
fn value_display_and_equality() {
	let list = Value::List(vec![Value::from("a"), Value::Int(1), Value::Null]);
	assert_eq!(list.to_string(), "['a', 1, None]");
	assert_eq!(Value::Bool(false).to_string(), "False");
	assert!(Value::Int(1).loose_eq(&Value::Float(1.0)));
	assert!(Value::Null.loose_eq(&Value::Undefined));
	assert!(!Value::Int(1).loose_eq(&Value::Null));
}

#[test]
fn memory_loader_is_case_insensitive() -> JinjacResult<()> {
	let mut loader = MemoryLoader::with_templates([("Pages/Index.html", "x")]);
	loader.add("/b.html", "y");

	assert!(loader.exists("pages/index.html"));
	assert_eq!(loader.load("./PAGES/INDEX.HTML")?, "x");
	assert_eq!(loader.list_all()?, vec!["b.html", "pages/index.html"]);
	assert_eq!(loader.remove("B.html"), Some("y".to_string()));
	assert!(matches!(
		loader.load("b.html"),
		Err(JinjacError::TemplateNotFound { .. })
	));

	Ok(())
}

#[test]
fn file_system_loader() -> JinjacResult<()> {
	let tmp = tempfile::tempdir()?;
	let root = tmp.path();
	std::fs::create_dir_all(root.join("_partials"))?;
	std::fs::create_dir_all(root.join("drafts"))?;
	std::fs::create_dir_all(root.join("node_modules"))?;
	std::fs::create_dir_all(root.join(".cache"))?;
	std::fs::write(root.join("index.html"), "Hello {{ name }}")?;
	std::fs::write(root.join("_partials/nav.html"), "<nav>")?;
	std::fs::write(root.join("drafts/wip.html"), "wip")?;
	std::fs::write(root.join("notes.md"), "# notes")?;
	std::fs::write(root.join("node_modules/dep.html"), "dep")?;
	std::fs::write(root.join(".cache/old.html"), "old")?;

	let loader = FileSystemLoader::new(root)?;
	assert_eq!(
		loader.list_all()?,
		vec!["_partials/nav.html", "drafts/wip.html", "index.html"]
	);
	assert!(loader.exists("_partials/nav.html"));
	assert!(!loader.exists("notes.md"));
	assert!(matches!(
		loader.load("../outside.html"),
		Err(JinjacError::TemplateNotFound { .. })
	));

	let excluded = FileSystemLoader::with_options(
		root,
		&["html".to_string()],
		&["drafts/".to_string()],
	)?;
	assert_eq!(excluded.list_all()?, vec!["_partials/nav.html", "index.html"]);

	let engine = Engine::builder().template_dir(root).build()?;
	assert_eq!(engine.render_json("index.html", json!({ "name": "disk" }))?, "Hello disk");
	assert!(engine.template_exists("index.html"));

	Ok(())
}

#[test]
fn template_cache_memoizes_and_invalidates() -> JinjacResult<()> {
	let engine = engine_with(&[("a.html", "a"), ("b.html", "{% include \"a.html\" %}b")])?;
	let context = RenderContext::new();

	assert!(engine.cache().is_empty());
	engine.render("b.html", &context)?;
	assert_eq!(engine.cache().len(), 2);
	assert!(engine.cache().contains("A.HTML"));

	assert!(engine.invalidate("a.html"));
	assert!(!engine.invalidate("a.html"));
	engine.clear_cache();
	assert!(engine.cache().is_empty());
	assert_eq!(engine.list_templates()?, vec!["a.html", "b.html"]);

	Ok(())
}

#[test]
#[traced_test]
fn logs_cache_activity() {
	let engine = engine_with(&[("a.html", "a")]).expect("engine builds");
	let context = RenderContext::new();
	engine.render("a.html", &context).expect("first render");
	engine.render("a.html", &context).expect("second render");

	assert!(logs_contain("template cache miss"));
	assert!(logs_contain("template cache hit"));
}

#[test]
#[traced_test]
fn logs_unknown_filters_and_tests() {
	let html = render("{{ \"x\"|sparkle }}{{ 1 is shiny }}", json!({})).expect("renders");
	assert_eq!(html, "xFalse");
	assert!(logs_contain("unknown filter"));
	assert!(logs_contain("unknown test"));
}

#[test]
#[traced_test]
fn logs_inheritance_chain() {
	let engine = engine_with(&layout_templates()).expect("engine builds");
	engine
		.render("page.html", &RenderContext::new())
		.expect("renders");
	assert!(logs_contain("page.html -> section.html -> base.html"));
}

#[test]
fn config_defaults() -> JinjacResult<()> {
	let config = JinjacConfig::parse("")?;

	assert_eq!(config.templates.dir, std::path::PathBuf::from("templates"));
	assert!(config.templates.extensions.contains(&"j2".to_string()));
	assert_eq!(config.output.dir, std::path::PathBuf::from("dist"));
	assert!(config.render.autoescape);
	assert!(config.render.keep_trailing_newline);
	assert_eq!(config.render.missing, MissingVariableBehavior::EmptyString);
	assert!(config.data.file.is_none());

	Ok(())
}

#[test]
fn config_parses_every_section() -> JinjacResult<()> {
	let config = JinjacConfig::parse(
		r#"
[templates]
dir = "site"
extensions = ["html"]
exclude = ["drafts/"]

[output]
dir = "public"
extension = "htm"

[render]
autoescape = false
missing = "strict"
trim_blocks = true
lstrip_blocks = true
keep_trailing_newline = false
static_prefix = "/assets/"

[data]
file = "data.toml"
"#,
	)?;

	assert_eq!(config.templates.dir, std::path::PathBuf::from("site"));
	assert_eq!(config.templates.extensions, vec!["html"]);
	assert_eq!(config.templates.exclude, vec!["drafts/"]);
	assert_eq!(config.output.extension.as_deref(), Some("htm"));
	assert!(!config.render.autoescape);
	assert_eq!(config.render.missing, MissingVariableBehavior::ThrowException);
	assert!(config.render.trim_blocks && config.render.lstrip_blocks);
	assert!(!config.render.keep_trailing_newline);
	assert_eq!(config.render.static_prefix.as_deref(), Some("/assets/"));
	assert_eq!(config.data.file, Some(std::path::PathBuf::from("data.toml")));

	Ok(())
}

#[test]
fn invalid_config_is_reported() {
	let error = JinjacConfig::parse("[render]\nautoescape = \"maybe\"\n").expect_err("must fail");
	assert!(matches!(error, JinjacError::ConfigParse(_)));
}

#[test]
fn config_drives_an_engine() -> JinjacResult<()> {
	let tmp = tempfile::tempdir()?;
	let root = tmp.path();
	assert!(JinjacConfig::load(root)?.is_none());

	std::fs::create_dir_all(root.join("templates"))?;
	std::fs::write(
		root.join(".jinjac.toml"),
		"[render]\nmissing = \"placeholder\"\n\n[data]\nfile = \"data.yaml\"\n",
	)?;
	std::fs::write(root.join("data.yaml"), "site:\n  title: Demo <1>\n")?;
	std::fs::write(root.join("templates/index.html"), "{{ site.title }} {{ unknown }}")?;

	let config = JinjacConfig::load(root)?.expect("config file exists");
	let engine = config.engine_builder(root)?.build()?;
	let data = config.load_data(root)?;

	assert_eq!(
		engine.render_json("index.html", data)?,
		"Demo &lt;1&gt; {{ unknown }}"
	);

	Ok(())
}

#[rstest]
#[case::json("{\"a\": [1, 2]}", "json", json!({ "a": [1, 2] }))]
#[case::toml("[site]\ncount = 3\nratio = 0.5\n", "toml", json!({ "site": { "count": 3, "ratio": 0.5 } }))]
#[case::yaml("a:\n  - x\n", "yml", json!({ "a": ["x"] }))]
fn parses_data_files(
	#[case] content: &str,
	#[case] format: &str,
	#[case] expected: serde_json::Value,
) -> JinjacResult<()> {
	assert_eq!(parse_data_file(content, format, "data")?, expected);
	Ok(())
}

#[test]
fn data_file_errors() {
	assert!(matches!(
		parse_data_file("a = 1", "ini", "data.ini"),
		Err(JinjacError::UnsupportedDataFormat(format)) if format == "ini"
	));
	assert!(matches!(
		parse_data_file("{", "json", "data.json"),
		Err(JinjacError::DataFile { path, .. }) if path == "data.json"
	));
	assert!(matches!(
		load_data_file(std::path::Path::new("does/not/exist.json")),
		Err(JinjacError::DataFile { .. })
	));
}
