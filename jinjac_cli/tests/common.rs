use std::path::Path;

use assert_cmd::Command;
use insta_cmd::get_cargo_bin;

pub fn jinjac_cmd() -> Command {
	let mut cmd = Command::new(get_cargo_bin("jinjac"));
	cmd.env("NO_COLOR", "1");
	cmd.env_remove("RUST_LOG");
	cmd
}

/// Write `files` below `root`, creating parent directories.
#[allow(dead_code)]
pub fn write_files(root: &Path, files: &[(&str, &str)]) -> std::io::Result<()> {
	for (path, content) in files {
		let path = root.join(path);
		if let Some(parent) = path.parent() {
			std::fs::create_dir_all(parent)?;
		}
		std::fs::write(path, content)?;
	}
	Ok(())
}

/// A small site: a layout, a partial, a macro library and two pages.
#[allow(dead_code)]
pub fn site(root: &Path) -> std::io::Result<()> {
	write_files(
		root,
		&[
			(
				"templates/_layouts/base.html",
				"<title>{% block title %}{{ site.name }}{% endblock %}</title>\n<main>{% block body %}{% endblock %}</main>\n",
			),
			("templates/_partials/nav.html", "<nav>{{ site.name }}</nav>"),
			(
				"templates/_macros/links.html",
				"{% macro link(href, text) %}<a href=\"{{ href }}\">{{ text }}</a>{% endmacro %}",
			),
			(
				"templates/index.html",
				"{% extends \"_layouts/base.html\" %}{% from \"_macros/links.html\" import link %}{% block title %}Home | {{ super() }}{% endblock %}{% block body %}{% include \"_partials/nav.html\" %}{{ link(\"/about/\", \"About\") }}{% endblock %}",
			),
			(
				"templates/blog/post.html",
				"{% extends \"_layouts/base.html\" %}{% block body %}{% for tag in tags %}{{ tag|upper }}{% if not loop.last %}, {% endif %}{% endfor %}{% endblock %}",
			),
			(
				"data.json",
				"{\"site\": {\"name\": \"Demo\"}, \"tags\": [\"rust\", \"web\"]}",
			),
		],
	)
}
