use std::path::Path;
use std::path::PathBuf;
use std::process;
use std::sync::atomic::AtomicBool;
use std::sync::atomic::Ordering;

use clap::Parser;
use jinjac_cli::Commands;
use jinjac_cli::JinjacCli;
use jinjac_cli::is_page_template;
use jinjac_cli::output_path;
use jinjac_core::AnyEmptyResult;
use jinjac_core::Engine;
use jinjac_core::JinjacConfig;
use jinjac_core::JinjacError;
use jinjac_core::MissingVariableBehavior;
use jinjac_core::RenderContext;
use owo_colors::OwoColorize;
use tracing::debug;
use tracing_subscriber::EnvFilter;

static USE_COLOR: AtomicBool = AtomicBool::new(true);

fn color_enabled() -> bool {
	USE_COLOR.load(Ordering::Relaxed)
}

/// Apply ANSI color codes only when color is enabled.
macro_rules! colored {
	($text:expr,red) => {
		if color_enabled() {
			format!("{}", $text.red())
		} else {
			format!("{}", $text)
		}
	};
	($text:expr,green) => {
		if color_enabled() {
			format!("{}", $text.green())
		} else {
			format!("{}", $text)
		}
	};
	($text:expr,yellow) => {
		if color_enabled() {
			format!("{}", $text.yellow())
		} else {
			format!("{}", $text)
		}
	};
	($text:expr,bold) => {
		if color_enabled() {
			format!("{}", $text.bold())
		} else {
			format!("{}", $text)
		}
	};
}

/// Settings of one `build` run, after command line overrides.
struct BuildOptions {
	templates: Option<PathBuf>,
	data: Option<PathBuf>,
	output: Option<PathBuf>,
	template: Option<String>,
	no_escape: bool,
	strict: bool,
}

fn main() {
	let args = JinjacCli::parse();

	// Respect NO_COLOR, --no-color and terminals without color support.
	let use_color = !args.no_color
		&& std::env::var_os("NO_COLOR").is_none()
		&& supports_color::on(supports_color::Stream::Stdout).is_some();
	if !use_color {
		USE_COLOR.store(false, Ordering::Relaxed);
	}

	init_tracing(args.verbose, use_color);

	miette::set_hook(Box::new(move |_| {
		Box::new(
			miette::MietteHandlerOpts::new()
				.color(use_color)
				.unicode(use_color)
				.build(),
		)
	}))
	.ok();

	let result = match &args.command {
		Some(Commands::Build {
			templates,
			data,
			output,
			template,
			no_escape,
			strict,
		}) => {
			run_build(
				&args,
				BuildOptions {
					templates: templates.clone(),
					data: data.clone(),
					output: output.clone(),
					template: template.clone(),
					no_escape: *no_escape,
					strict: *strict,
				},
			)
		}
		Some(Commands::Validate { templates }) => run_validate(&args, templates.as_deref()),
		Some(Commands::List { templates }) => run_list(&args, templates.as_deref()),
		None => {
			eprintln!("No subcommand specified. Run `jinjac --help` for usage.");
			process::exit(1);
		}
	};

	if let Err(e) = result {
		match e.downcast::<JinjacError>() {
			Ok(jinjac_err) => {
				let report: miette::Report = (*jinjac_err).into();
				eprintln!("{report:?}");
			}
			Err(e) => {
				eprintln!("{} {e}", colored!("error:", red));
			}
		}
		process::exit(2);
	}
}

/// Log to stderr. `RUST_LOG` wins; otherwise warnings, or debug output with
/// `--verbose`.
fn init_tracing(verbose: bool, use_color: bool) {
	let default_level = if verbose { "debug" } else { "warn" };
	let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

	tracing_subscriber::fmt()
		.with_env_filter(filter)
		.with_writer(std::io::stderr)
		.with_ansi(use_color)
		.with_target(false)
		.without_time()
		.init();
}

fn resolve_root(args: &JinjacCli) -> PathBuf {
	args.path
		.clone()
		.unwrap_or_else(|| std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")))
}

/// The project config at `root`, or the defaults when there is none.
fn load_config(root: &Path, templates: Option<&Path>) -> Result<JinjacConfig, JinjacError> {
	let mut config = JinjacConfig::load(root)?.unwrap_or_default();
	if let Some(templates) = templates {
		config.templates.dir = templates.to_path_buf();
	}
	Ok(config)
}

fn build_engine(root: &Path, config: &JinjacConfig) -> Result<Engine, JinjacError> {
	config.engine_builder(root)?.build()
}

fn run_build(args: &JinjacCli, options: BuildOptions) -> AnyEmptyResult {
	let root = resolve_root(args);
	let mut config = load_config(&root, options.templates.as_deref())?;
	if let Some(data) = options.data {
		config.data.file = Some(data);
	}
	if let Some(output) = options.output {
		config.output.dir = output;
	}
	if options.no_escape {
		config.render.autoescape = false;
	}
	if options.strict {
		config.render.missing = MissingVariableBehavior::ThrowException;
	}

	let engine = build_engine(&root, &config)?;
	let context = RenderContext::from_json(config.load_data(&root)?);
	let pages = match options.template {
		Some(template) => vec![template],
		None => {
			engine
				.list_templates()?
				.into_iter()
				.filter(|path| is_page_template(path))
				.collect()
		}
	};

	let output_dir = root.join(&config.output.dir);
	let mut warning_count = 0;
	debug!(pages = pages.len(), output = %output_dir.display(), "building templates");

	for page in &pages {
		let output = engine.render_with_assets(page, &context)?;
		for warning in &output.warnings {
			warning_count += 1;
			eprintln!("{} {page}: {warning}", colored!("warning:", yellow));
		}

		let target = output_path(&output_dir, page, config.output.extension.as_deref());
		if let Some(parent) = target.parent() {
			std::fs::create_dir_all(parent)?;
		}
		std::fs::write(&target, &output.html)?;
		debug!(template = %page, target = %target.display(), assets = output.assets.len(), "rendered template");

		if args.verbose {
			println!("  {page} -> {}", target.display());
			for asset in &output.assets {
				println!("    asset: {asset}");
			}
		}
	}

	println!(
		"{} Rendered {} template(s) into {}",
		colored!("✓", green),
		pages.len(),
		output_dir.display()
	);
	if warning_count > 0 {
		println!("{} {warning_count} warning(s)", colored!("!", yellow));
	}

	Ok(())
}

fn run_validate(args: &JinjacCli, templates: Option<&Path>) -> AnyEmptyResult {
	let root = resolve_root(args);
	let config = load_config(&root, templates)?;
	let engine = build_engine(&root, &config)?;
	let paths = engine.list_templates()?;
	let mut failures = 0;

	for path in &paths {
		match engine.resolve(path) {
			Ok(resolved) => {
				if args.verbose {
					println!("  {} {}", colored!("✓", green), resolved.chain.join(" -> "));
				}
			}
			Err(e) => {
				failures += 1;
				eprintln!("{} {path}: {e}", colored!("✗", red));
			}
		}
	}

	if failures > 0 {
		return Err(format!("{failures} of {} template(s) failed validation", paths.len()).into());
	}

	println!(
		"{} All {} template(s) are valid.",
		colored!("✓", green),
		paths.len()
	);

	Ok(())
}

fn run_list(args: &JinjacCli, templates: Option<&Path>) -> AnyEmptyResult {
	let root = resolve_root(args);
	let config = load_config(&root, templates)?;
	let engine = build_engine(&root, &config)?;
	let paths = engine.list_templates()?;

	if paths.is_empty() {
		println!("No templates found in {}", root.join(&config.templates.dir).display());
		return Ok(());
	}

	println!("{}", colored!(format!("Templates ({}):", paths.len()), bold));
	for path in &paths {
		if is_page_template(path) {
			println!("  {path}");
		} else {
			println!("  {path} (partial)");
		}
	}

	Ok(())
}
