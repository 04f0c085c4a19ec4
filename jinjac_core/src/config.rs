use std::path::Path;
use std::path::PathBuf;

use serde::Deserialize;

use crate::Engine;
use crate::EngineBuilder;
use crate::FileSystemLoader;
use crate::JinjacError;
use crate::JinjacResult;
use crate::MissingVariableBehavior;
use crate::loader::DEFAULT_EXTENSIONS;

/// Supported config file locations in discovery order (highest precedence
/// first).
pub const CONFIG_FILE_CANDIDATES: [&str; 2] = ["jinjac.toml", ".jinjac.toml"];

/// Configuration loaded from a `jinjac.toml` file.
///
/// ```toml
/// [templates]
/// dir = "templates"
/// extensions = ["html", "j2"]
/// exclude = ["drafts/"]
///
/// [output]
/// dir = "dist"
/// extension = "html"
///
/// [render]
/// autoescape = true
/// missing = "strict"
/// trim_blocks = true
/// lstrip_blocks = true
/// keep_trailing_newline = true
/// static_prefix = "/assets/"
///
/// [data]
/// file = "data.yaml"
/// ```
#[derive(Debug, Default, Deserialize)]
pub struct JinjacConfig {
	#[serde(default)]
	pub templates: TemplatesConfig,
	#[serde(default)]
	pub output: OutputConfig,
	#[serde(default)]
	pub render: RenderConfig,
	#[serde(default)]
	pub data: DataConfig,
}

/// Where templates live and which files count as templates.
#[derive(Debug, Deserialize)]
pub struct TemplatesConfig {
	#[serde(default = "default_templates_dir")]
	pub dir: PathBuf,
	/// Template file extensions, without the leading dot.
	#[serde(default = "default_extensions")]
	pub extensions: Vec<String>,
	/// Gitignore-style patterns hiding templates from listings and builds.
	#[serde(default)]
	pub exclude: Vec<String>,
}

impl Default for TemplatesConfig {
	fn default() -> Self {
		Self {
			dir: default_templates_dir(),
			extensions: default_extensions(),
			exclude: vec![],
		}
	}
}

#[derive(Debug, Deserialize)]
pub struct OutputConfig {
	#[serde(default = "default_output_dir")]
	pub dir: PathBuf,
	/// Extension given to rendered files. When absent the template's own
	/// extension is kept.
	#[serde(default)]
	pub extension: Option<String>,
}

impl Default for OutputConfig {
	fn default() -> Self {
		Self {
			dir: default_output_dir(),
			extension: None,
		}
	}
}

#[derive(Debug, Deserialize)]
pub struct RenderConfig {
	#[serde(default = "default_true")]
	pub autoescape: bool,
	#[serde(default)]
	pub missing: MissingVariableBehavior,
	#[serde(default)]
	pub trim_blocks: bool,
	#[serde(default)]
	pub lstrip_blocks: bool,
	#[serde(default = "default_true")]
	pub keep_trailing_newline: bool,
	#[serde(default)]
	pub static_prefix: Option<String>,
}

impl Default for RenderConfig {
	fn default() -> Self {
		Self {
			autoescape: true,
			missing: MissingVariableBehavior::default(),
			trim_blocks: false,
			lstrip_blocks: false,
			keep_trailing_newline: true,
			static_prefix: None,
		}
	}
}

#[derive(Debug, Default, Deserialize)]
pub struct DataConfig {
	/// A JSON, TOML or YAML file providing the render context.
	#[serde(default)]
	pub file: Option<PathBuf>,
}

fn default_templates_dir() -> PathBuf {
	PathBuf::from("templates")
}

fn default_output_dir() -> PathBuf {
	PathBuf::from("dist")
}

fn default_extensions() -> Vec<String> {
	DEFAULT_EXTENSIONS.iter().map(ToString::to_string).collect()
}

fn default_true() -> bool {
	true
}

impl JinjacConfig {
	/// Resolve the config path from known discovery candidates.
	#[must_use]
	pub fn resolve_path(root: &Path) -> Option<PathBuf> {
		CONFIG_FILE_CANDIDATES
			.iter()
			.map(|candidate| root.join(candidate))
			.find(|path| path.is_file())
	}

	/// Load the config from the first discovered config file at `root`.
	/// Returns `None` if no config file exists.
	pub fn load(root: &Path) -> JinjacResult<Option<JinjacConfig>> {
		let Some(config_path) = Self::resolve_path(root) else {
			return Ok(None);
		};

		let content = std::fs::read_to_string(&config_path)?;
		let config = Self::parse(&content)?;

		Ok(Some(config))
	}

	pub fn parse(content: &str) -> JinjacResult<JinjacConfig> {
		toml::from_str(content).map_err(|e| JinjacError::ConfigParse(e.to_string()))
	}

	/// A builder for an engine serving `self.templates.dir` (relative to
	/// `root`) with the configured render options.
	pub fn engine_builder(&self, root: &Path) -> JinjacResult<EngineBuilder> {
		let loader = FileSystemLoader::with_options(
			root.join(&self.templates.dir),
			&self.templates.extensions,
			&self.templates.exclude,
		)?;

		let mut builder = Engine::builder()
			.loader(loader)
			.autoescape(self.render.autoescape)
			.missing_variable(self.render.missing)
			.trim_blocks(self.render.trim_blocks)
			.lstrip_blocks(self.render.lstrip_blocks)
			.keep_trailing_newline(self.render.keep_trailing_newline);

		if let Some(prefix) = &self.render.static_prefix {
			builder = builder.static_prefix(prefix.clone());
		}

		Ok(builder)
	}

	/// Read the configured data file relative to `root`. Without a data file
	/// the context is an empty object.
	pub fn load_data(&self, root: &Path) -> JinjacResult<serde_json::Value> {
		match &self.data.file {
			Some(path) => load_data_file(&root.join(path)),
			None => Ok(serde_json::Value::Object(serde_json::Map::new())),
		}
	}
}

/// Read a data file, choosing the format from its extension.
pub fn load_data_file(path: &Path) -> JinjacResult<serde_json::Value> {
	let display = path.display().to_string();
	let content = std::fs::read_to_string(path).map_err(|e| {
		JinjacError::DataFile {
			path: display.clone(),
			reason: e.to_string(),
		}
	})?;
	let format = path
		.extension()
		.and_then(|e| e.to_str())
		.unwrap_or("")
		.to_ascii_lowercase();

	parse_data_file(&content, &format, &display)
}

/// Parse data file `content` in `format` (`json`, `toml`, `yaml` or `yml`).
pub fn parse_data_file(content: &str, format: &str, path_display: &str) -> JinjacResult<serde_json::Value> {
	let data_error = |reason: String| {
		JinjacError::DataFile {
			path: path_display.to_string(),
			reason,
		}
	};

	match format {
		"json" => serde_json::from_str(content).map_err(|e| data_error(e.to_string())),
		"toml" => {
			let value: toml::Value = toml::from_str(content).map_err(|e| data_error(e.to_string()))?;
			toml_to_json(value).ok_or_else(|| data_error("contains a non-finite float".to_string()))
		}
		"yaml" | "yml" => serde_yaml_ng::from_str(content).map_err(|e| data_error(e.to_string())),
		other => Err(JinjacError::UnsupportedDataFormat(other.to_string())),
	}
}

/// Convert a `toml::Value` to a `serde_json::Value`. Integers stay integers.
/// Returns `None` for NaN or infinite floats, which JSON cannot hold.
fn toml_to_json(value: toml::Value) -> Option<serde_json::Value> {
	let json = match value {
		toml::Value::String(s) => serde_json::Value::String(s),
		toml::Value::Integer(i) => serde_json::Value::Number(i.into()),
		toml::Value::Float(f) => serde_json::Value::Number(serde_json::Number::from_f64(f)?),
		toml::Value::Boolean(b) => serde_json::Value::Bool(b),
		toml::Value::Datetime(dt) => serde_json::Value::String(dt.to_string()),
		toml::Value::Array(arr) => {
			serde_json::Value::Array(arr.into_iter().map(toml_to_json).collect::<Option<Vec<_>>>()?)
		}
		toml::Value::Table(table) => {
			let mut map = serde_json::Map::new();
			for (k, v) in table {
				map.insert(k, toml_to_json(v)?);
			}
			serde_json::Value::Object(map)
		}
	};

	Some(json)
}
