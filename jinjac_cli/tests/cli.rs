use std::path::Path;
use std::path::PathBuf;

use clap::Parser;
use jinjac_cli::Commands;
use jinjac_cli::JinjacCli;
use jinjac_cli::is_page_template;
use jinjac_cli::output_path;
use rstest::rstest;
use similar_asserts::assert_eq;

#[test]
fn parses_build_flags() {
	let cli = JinjacCli::parse_from([
		"jinjac",
		"build",
		"--templates",
		"site",
		"--data",
		"data.yaml",
		"--output",
		"public",
		"--template",
		"index.html",
		"--no-escape",
		"--strict",
		"-v",
	]);

	assert!(cli.verbose);
	let Some(Commands::Build {
		templates,
		data,
		output,
		template,
		no_escape,
		strict,
	}) = cli.command
	else {
		panic!("expected the build command");
	};
	assert_eq!(templates, Some(PathBuf::from("site")));
	assert_eq!(data, Some(PathBuf::from("data.yaml")));
	assert_eq!(output, Some(PathBuf::from("public")));
	assert_eq!(template.as_deref(), Some("index.html"));
	assert!(no_escape);
	assert!(strict);
}

#[test]
fn parses_global_flags_after_the_subcommand() {
	let cli = JinjacCli::parse_from(["jinjac", "validate", "--path", "/tmp/site", "--no-color"]);

	assert_eq!(cli.path, Some(PathBuf::from("/tmp/site")));
	assert!(cli.no_color);
	assert!(matches!(cli.command, Some(Commands::Validate { templates: None })));
}

#[test]
fn parses_without_subcommand() {
	let cli = JinjacCli::parse_from(["jinjac"]);
	assert!(cli.command.is_none());
	assert!(!cli.verbose);
}

#[test]
fn rejects_unknown_flags() {
	assert!(JinjacCli::try_parse_from(["jinjac", "list", "--watch"]).is_err());
}

#[rstest]
#[case::root_page("index.html", true)]
#[case::nested_page("blog/post.html", true)]
#[case::partial_file("_nav.html", false)]
#[case::layout_dir("_layouts/base.html", false)]
#[case::nested_partial_dir("blog/_partials/card.html", false)]
#[case::underscore_inside_name("my_page.html", true)]
fn page_templates(#[case] path: &str, #[case] expected: bool) {
	assert_eq!(is_page_template(path), expected);
}

#[rstest]
#[case::keeps_extension("blog/post.j2", None, "dist/blog/post.j2")]
#[case::replaces_extension("blog/post.j2", Some("html"), "dist/blog/post.html")]
#[case::strips_leading_dot("index.jinja", Some(".htm"), "dist/index.htm")]
fn output_paths(#[case] path: &str, #[case] extension: Option<&str>, #[case] expected: &str) {
	assert_eq!(
		output_path(Path::new("dist"), path, extension),
		PathBuf::from(expected)
	);
}
