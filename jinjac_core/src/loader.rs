use std::collections::HashMap;
use std::fmt;
use std::path::Component;
use std::path::Path;
use std::path::PathBuf;

use globset::Glob;
use globset::GlobSet;
use globset::GlobSetBuilder;
use ignore::gitignore::Gitignore;
use ignore::gitignore::GitignoreBuilder;
use tracing::debug;

use crate::JinjacError;
use crate::JinjacResult;

/// File extensions recognized as templates by [`FileSystemLoader`].
pub const DEFAULT_EXTENSIONS: &[&str] = &["html", "htm", "jinja", "jinja2", "j2", "txt", "xml"];

/// Source of template text, addressed by `/`-separated relative paths.
pub trait TemplateLoader: Send + Sync + fmt::Debug {
	/// Read the source of the template at `path`.
	fn load(&self, path: &str) -> JinjacResult<String>;

	fn exists(&self, path: &str) -> bool;

	/// Every template path this loader can serve, sorted.
	fn list_all(&self) -> JinjacResult<Vec<String>>;
}

/// Normalize a template path: forward slashes, no leading `/` or `./`.
pub fn normalize_path(path: &str) -> String {
	let path = path.trim().replace('\\', "/");
	let mut path = path.as_str();
	loop {
		if let Some(rest) = path.strip_prefix("./") {
			path = rest;
		} else if let Some(rest) = path.strip_prefix('/') {
			path = rest;
		} else {
			break;
		}
	}
	path.to_string()
}

/// Templates held in memory. Lookups are case-insensitive.
#[derive(Debug, Clone, Default)]
pub struct MemoryLoader {
	templates: HashMap<String, String>,
}

impl MemoryLoader {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn with_templates<I, K, V>(templates: I) -> Self
	where
		I: IntoIterator<Item = (K, V)>,
		K: AsRef<str>,
		V: Into<String>,
	{
		let mut loader = Self::new();
		for (path, source) in templates {
			loader.add(path.as_ref(), source);
		}
		loader
	}

	pub fn add(&mut self, path: &str, source: impl Into<String>) {
		self.templates.insert(key(path), source.into());
	}

	pub fn remove(&mut self, path: &str) -> Option<String> {
		self.templates.remove(&key(path))
	}
}

fn key(path: &str) -> String {
	normalize_path(path).to_lowercase()
}

impl TemplateLoader for MemoryLoader {
	fn load(&self, path: &str) -> JinjacResult<String> {
		self.templates
			.get(&key(path))
			.cloned()
			.ok_or_else(|| JinjacError::not_found(path, None))
	}

	fn exists(&self, path: &str) -> bool {
		self.templates.contains_key(&key(path))
	}

	fn list_all(&self) -> JinjacResult<Vec<String>> {
		let mut paths: Vec<String> = self.templates.keys().cloned().collect();
		paths.sort();
		Ok(paths)
	}
}

/// Templates read from a directory tree.
///
/// Only files whose extension is in the configured list are served. Paths that
/// escape the root with `..` or are absolute are rejected. A `.gitignore` at
/// the root and any extra exclude patterns hide matching files from
/// [`TemplateLoader::list_all`].
pub struct FileSystemLoader {
	root: PathBuf,
	extensions: Vec<String>,
	include_set: GlobSet,
	exclude: Gitignore,
}

impl fmt::Debug for FileSystemLoader {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("FileSystemLoader")
			.field("root", &self.root)
			.field("extensions", &self.extensions)
			.finish_non_exhaustive()
	}
}

impl FileSystemLoader {
	pub fn new(root: impl Into<PathBuf>) -> JinjacResult<Self> {
		let extensions = DEFAULT_EXTENSIONS.iter().map(ToString::to_string).collect::<Vec<_>>();
		Self::with_options(root, &extensions, &[])
	}

	/// Build a loader for `root` serving `extensions` (without the leading dot)
	/// and hiding paths that match the gitignore-style `exclude` patterns.
	pub fn with_options(
		root: impl Into<PathBuf>,
		extensions: &[String],
		exclude: &[String],
	) -> JinjacResult<Self> {
		let root = root.into();
		let extensions: Vec<String> = extensions
			.iter()
			.map(|extension| extension.trim_start_matches('.').to_lowercase())
			.filter(|extension| !extension.is_empty())
			.collect();

		Ok(Self {
			include_set: build_extension_set(&extensions)?,
			exclude: build_exclude_matcher(&root, exclude)?,
			root,
			extensions,
		})
	}

	pub fn root(&self) -> &Path {
		&self.root
	}

	/// Resolve `path` under the root, rejecting traversal and unknown
	/// extensions.
	fn resolve(&self, path: &str) -> JinjacResult<PathBuf> {
		let normalized = normalize_path(path);
		let relative = Path::new(&normalized);

		let escapes = relative.components().any(|component| {
			matches!(
				component,
				Component::ParentDir | Component::RootDir | Component::Prefix(_)
			)
		});
		if escapes || normalized.is_empty() {
			return Err(JinjacError::not_found(path, None));
		}

		if !self.include_set.is_match(relative) {
			debug!(path = %normalized, "rejected template with unsupported extension");
			return Err(JinjacError::not_found(path, None));
		}

		Ok(self.root.join(relative))
	}
}

impl TemplateLoader for FileSystemLoader {
	fn load(&self, path: &str) -> JinjacResult<String> {
		let resolved = self.resolve(path)?;
		if !resolved.is_file() {
			return Err(JinjacError::not_found(path, None));
		}
		Ok(std::fs::read_to_string(resolved)?)
	}

	fn exists(&self, path: &str) -> bool {
		self.resolve(path).is_ok_and(|resolved| resolved.is_file())
	}

	fn list_all(&self) -> JinjacResult<Vec<String>> {
		let mut files = vec![];
		walk_dir(&self.root, &self.root, &self.include_set, &self.exclude, &mut files)?;
		files.sort();
		Ok(files)
	}
}

fn build_extension_set(extensions: &[String]) -> JinjacResult<GlobSet> {
	let mut builder = GlobSetBuilder::new();
	for extension in extensions {
		let pattern = format!("**/*.{extension}");
		let glob = Glob::new(&pattern).map_err(|e| {
			JinjacError::ConfigParse(format!("invalid template extension `{extension}`: {e}"))
		})?;
		builder.add(glob);
	}
	builder
		.build()
		.map_err(|e| JinjacError::ConfigParse(format!("failed to build extension set: {e}")))
}

fn build_exclude_matcher(root: &Path, patterns: &[String]) -> JinjacResult<Gitignore> {
	let mut builder = GitignoreBuilder::new(root);
	let gitignore = root.join(".gitignore");
	if gitignore.is_file() {
		if let Some(error) = builder.add(gitignore) {
			debug!(%error, "ignoring unreadable .gitignore");
		}
	}

	for pattern in patterns {
		builder.add_line(None, pattern).map_err(|e| {
			JinjacError::ConfigParse(format!("invalid exclude pattern `{pattern}`: {e}"))
		})?;
	}

	builder
		.build()
		.map_err(|e| JinjacError::ConfigParse(format!("failed to build exclude rules: {e}")))
}

fn is_ignored_directory_name(name: &str) -> bool {
	name.starts_with('.') || name == "node_modules" || name == "target"
}

fn walk_dir(
	root: &Path,
	dir: &Path,
	include_set: &GlobSet,
	exclude: &Gitignore,
	files: &mut Vec<String>,
) -> JinjacResult<()> {
	if !dir.is_dir() {
		return Ok(());
	}

	for entry in std::fs::read_dir(dir)? {
		let path = entry?.path();
		let is_dir = path.is_dir();

		if is_dir
			&& path
				.file_name()
				.and_then(|name| name.to_str())
				.is_some_and(is_ignored_directory_name)
		{
			continue;
		}

		if exclude.matched(&path, is_dir).is_ignore() {
			continue;
		}

		if is_dir {
			walk_dir(root, &path, include_set, exclude, files)?;
			continue;
		}

		let Ok(relative) = path.strip_prefix(root) else {
			continue;
		};
		if include_set.is_match(relative) {
			files.push(normalize_path(&relative.to_string_lossy()));
		}
	}

	Ok(())
}
