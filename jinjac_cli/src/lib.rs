use std::path::Path;
use std::path::PathBuf;

use clap::Parser;
use clap::Subcommand;

#[derive(Parser)]
#[command(
	author,
	version,
	about = "Compile Jinja-style templates into static HTML.",
	long_about = "jinjac renders a directory of Jinja-style templates into static HTML.\n\nIt \
	              supports template inheritance with blocks and super(), includes, macros \
	              and imports, loops, filters and tests. Render data comes from a JSON, TOML \
	              or YAML file and settings from an optional `jinjac.toml`.\n\nQuick start:\n  \
	              jinjac build     Render every page template into the output directory\n  \
	              jinjac validate  Parse and resolve every template\n  jinjac list      \
	              Show the templates jinjac can see"
)]
pub struct JinjacCli {
	#[command(subcommand)]
	pub command: Option<Commands>,

	/// Path to the project root directory.
	#[arg(long, short, global = true)]
	pub path: Option<PathBuf>,

	/// Enable verbose output.
	#[arg(long, short, global = true, default_value_t = false)]
	pub verbose: bool,

	/// Disable colored output.
	#[arg(long, global = true, default_value_t = false)]
	pub no_color: bool,
}

#[derive(Subcommand)]
pub enum Commands {
	/// Render every page template into the output directory.
	///
	/// Page templates are all templates except those whose name starts with
	/// `_` or that live under a `_`-prefixed directory such as `_layouts/`,
	/// `_partials/` or `_macros/`. Those are only used through `extends`,
	/// `include` and `import`.
	Build {
		/// Template directory. Overrides `[templates] dir` from `jinjac.toml`.
		#[arg(long)]
		templates: Option<PathBuf>,

		/// JSON, TOML or YAML file providing the render context. Overrides
		/// `[data] file` from `jinjac.toml`.
		#[arg(long)]
		data: Option<PathBuf>,

		/// Output directory. Overrides `[output] dir` from `jinjac.toml`.
		#[arg(long)]
		output: Option<PathBuf>,

		/// Render only this template, even when it is not a page template.
		#[arg(long)]
		template: Option<String>,

		/// Disable HTML autoescaping of substituted values.
		#[arg(long, default_value_t = false)]
		no_escape: bool,

		/// Fail on undefined variables instead of rendering them empty.
		#[arg(long, default_value_t = false)]
		strict: bool,
	},
	/// Parse and resolve every template, reporting each failure.
	///
	/// Exits with a non-zero status code when any template fails to parse or
	/// its inheritance chain cannot be resolved. Ideal for CI pipelines.
	Validate {
		/// Template directory. Overrides `[templates] dir` from `jinjac.toml`.
		#[arg(long)]
		templates: Option<PathBuf>,
	},
	/// List every template path known to the loader.
	List {
		/// Template directory. Overrides `[templates] dir` from `jinjac.toml`.
		#[arg(long)]
		templates: Option<PathBuf>,
	},
}

/// Whether `path` is a page that `build` renders on its own. Names starting
/// with `_` and anything below a `_`-prefixed directory are layouts, partials
/// or macro libraries.
pub fn is_page_template(path: &str) -> bool {
	!path
		.split('/')
		.any(|segment| segment.starts_with('_'))
}

/// Where the rendered form of template `path` is written. With `extension`
/// set the template's own extension is replaced.
pub fn output_path(output_dir: &Path, path: &str, extension: Option<&str>) -> PathBuf {
	let target = output_dir.join(path);
	match extension {
		Some(extension) => target.with_extension(extension.trim_start_matches('.')),
		None => target,
	}
}
