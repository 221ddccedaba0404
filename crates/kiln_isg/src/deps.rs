//! Template dependency discovery.
//!
//! A page depends on its layout and on every partial the layout references,
//! transitively. Templates are discovered lazily: the layout's text is scanned
//! for partial references, each reference is resolved against the partial
//! directories visible from the page, and each resolved partial is scanned in
//! turn. The traversal keeps an explicit set of templates currently being
//! expanded so that a template reaching itself again is reported as a
//! [`IsgError::CircularDependency`] instead of looping.
//!
//! Template text and per-directory partial indexes are memoized inside the
//! [`DependencyTracker`]. Both caches are read-through and idempotent, so
//! concurrent use from several build threads is safe; [`DependencyTracker::reset`]
//! forces a cold re-scan.

use std::collections::{HashMap, HashSet};
use std::path::{Component, Path, PathBuf};
use std::sync::{Arc, LazyLock, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use kiln_common::Page;
use kiln_config::SiteConfig;
use regex::Regex;

use crate::error::IsgError;

/// File extension of templates.
pub const TEMPLATE_EXT: &str = "eta";

/// Conventional layout file name, searched from the page directory upward.
pub const LAYOUT_FILE: &str = "_layout.eta";

/// Layout used by directory index pages when present next to them.
pub const INDEX_LAYOUT_FILE: &str = "index.eta";

/// `it.partials.header` / `it.partials.header(...)`
static DOTTED_REF: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"[A-Za-z_$][\w$]*\.partials\.([A-Za-z_$][\w$]*)(\s*\()?")
        .expect("dotted partial reference pattern is valid")
});

/// `it.partials['header']` / `it.partials["header"](...)`
static BRACKET_REF: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"[A-Za-z_$][\w$]*\.partials\[\s*(?:'([^'\]]*)'|"([^"\]]*)")\s*\](\s*\()?"#)
        .expect("bracket partial reference pattern is valid")
});

/// A partial reference found in template text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartialRef {
    /// The referenced partial name, e.g. `header` or `nav/menu`.
    pub name: String,
    /// Whether the reference is invoked (`...partials.x(`) rather than read.
    pub callable: bool,
}

/// Maps partial names to files for one page directory.
type PartialIndex = HashMap<String, PathBuf>;

/// Discovers the template files a page's render depends on.
#[derive(Debug, Default)]
pub struct DependencyTracker {
    /// Template text keyed by normalized path.
    templates: RwLock<HashMap<PathBuf, Arc<str>>>,
    /// Resolved partial indexes keyed by normalized page directory.
    partial_indexes: RwLock<HashMap<PathBuf, Arc<PartialIndex>>>,
}

impl DependencyTracker {
    /// Creates a tracker with empty caches.
    pub fn new() -> Self {
        Self::default()
    }

    /// Clears both the template content cache and the partial index cache.
    pub fn reset(&self) {
        write_lock(&self.templates).clear();
        write_lock(&self.partial_indexes).clear();
        tracing::debug!("dependency caches cleared");
    }

    /// Number of template files currently cached.
    pub fn cached_templates(&self) -> usize {
        read_lock(&self.templates).len()
    }

    /// Number of page directories with a cached partial index.
    pub fn cached_partial_indexes(&self) -> usize {
        read_lock(&self.partial_indexes).len()
    }

    /// Returns the templates `page` depends on: the layout first, then every
    /// referenced partial in discovery order.
    ///
    /// Paths are absolute, lexically normalized and `/`-separated. Without a
    /// configured source directory, or without any layout, the result is empty.
    ///
    /// # Errors
    ///
    /// [`IsgError::CircularDependency`] if a template reaches itself.
    /// [`IsgError::Io`] or [`IsgError::PartialPattern`] if a partial
    /// directory cannot be searched. An unreadable template is not an error:
    /// it is still reported, it just contributes no further references.
    pub fn track(&self, page: &Page, config: &SiteConfig) -> Result<Vec<String>, IsgError> {
        let Some(src_dir) = config.src_dir() else {
            return Ok(Vec::new());
        };
        let src_dir = absolute_normalized(src_dir)?;
        let source = normalize_path(&src_dir.join(&page.source_path));
        let page_dir = source
            .parent()
            .map_or_else(|| src_dir.clone(), Path::to_path_buf);

        let Some(layout) = resolve_layout(page, &src_dir, &page_dir) else {
            tracing::debug!(page = %page.source_path.display(), "no layout found");
            return Ok(Vec::new());
        };

        let index = self.partial_index(&src_dir, &page_dir)?;
        let deps = self.expand(layout, &index)?;
        Ok(deps.iter().map(|p| to_slash(p)).collect())
    }

    /// Depth-first expansion of `root` and everything it references.
    fn expand(&self, root: PathBuf, index: &PartialIndex) -> Result<Vec<PathBuf>, IsgError> {
        struct Frame {
            path: PathBuf,
            children: Vec<PathBuf>,
            next: usize,
        }

        let mut order = vec![root.clone()];
        let mut seen: HashSet<PathBuf> = HashSet::from([root.clone()]);
        let mut in_progress: HashSet<PathBuf> = HashSet::from([root.clone()]);
        let mut stack = vec![Frame {
            children: self.referenced_partials(&root, index),
            path: root,
            next: 0,
        }];

        while let Some(frame) = stack.last_mut() {
            let Some(child) = frame.children.get(frame.next).cloned() else {
                if let Some(done) = stack.pop() {
                    in_progress.remove(&done.path);
                }
                continue;
            };
            frame.next += 1;

            if in_progress.contains(&child) {
                let mut chain: Vec<PathBuf> = stack.iter().map(|f| f.path.clone()).collect();
                chain.push(child);
                return Err(IsgError::CircularDependency { chain });
            }
            if !seen.insert(child.clone()) {
                continue;
            }

            in_progress.insert(child.clone());
            order.push(child.clone());
            let children = self.referenced_partials(&child, index);
            stack.push(Frame {
                path: child,
                children,
                next: 0,
            });
        }

        Ok(order)
    }

    /// Resolved files of the partials `template` references, deduplicated,
    /// in order of first reference.
    fn referenced_partials(&self, template: &Path, index: &PartialIndex) -> Vec<PathBuf> {
        let text = match self.read_template(template) {
            Ok(text) => text,
            Err(e) => {
                tracing::warn!(
                    path = %template.display(),
                    error = %e,
                    "could not scan template for partial references"
                );
                return Vec::new();
            }
        };

        let mut resolved: Vec<PathBuf> = Vec::new();
        for reference in scan_partial_refs(&text) {
            match index.get(&reference.name) {
                Some(path) if !resolved.contains(path) => resolved.push(path.clone()),
                Some(_) => {}
                None => tracing::debug!(
                    template = %template.display(),
                    partial = %reference.name,
                    callable = reference.callable,
                    "unresolved partial reference"
                ),
            }
        }
        resolved
    }

    fn read_template(&self, path: &Path) -> std::io::Result<Arc<str>> {
        if let Some(text) = read_lock(&self.templates).get(path) {
            return Ok(Arc::clone(text));
        }
        let text: Arc<str> = std::fs::read_to_string(path)?.into();
        write_lock(&self.templates).insert(path.to_path_buf(), Arc::clone(&text));
        Ok(text)
    }

    /// Partials visible from `page_dir`: every underscore-prefixed directory
    /// directly inside a directory on the chain from `src_dir` down to
    /// `page_dir`. Deeper levels override shallower ones.
    fn partial_index(&self, src_dir: &Path, page_dir: &Path) -> Result<Arc<PartialIndex>, IsgError> {
        if let Some(index) = read_lock(&self.partial_indexes).get(page_dir) {
            return Ok(Arc::clone(index));
        }

        let mut index = PartialIndex::new();
        for dir in chain_down(src_dir, page_dir) {
            let mut level = PartialIndex::new();
            for partial_dir in underscore_dirs(&dir)? {
                let mut files = glob_templates(&partial_dir)?;
                files.sort_by(|a, b| {
                    (a.components().count(), a).cmp(&(b.components().count(), b))
                });
                for file in &files {
                    if let Ok(rel) = file.strip_prefix(&partial_dir) {
                        level
                            .entry(to_slash(&rel.with_extension("")))
                            .or_insert_with(|| file.clone());
                    }
                }
                for file in &files {
                    if let Some(stem) = file.file_stem().and_then(|s| s.to_str()) {
                        level.entry(stem.to_string()).or_insert_with(|| file.clone());
                    }
                }
            }
            index.extend(level);
        }

        let index = Arc::new(index);
        write_lock(&self.partial_indexes).insert(page_dir.to_path_buf(), Arc::clone(&index));
        Ok(index)
    }
}

/// Finds partial references in template text, in order of appearance.
///
/// Both `ns.partials.name` and `ns.partials['name']` are recognized, invoked
/// or not.
pub fn scan_partial_refs(text: &str) -> Vec<PartialRef> {
    let mut found: Vec<(usize, PartialRef)> = Vec::new();
    for caps in DOTTED_REF.captures_iter(text) {
        let (Some(whole), Some(name)) = (caps.get(0), caps.get(1)) else {
            continue;
        };
        found.push((
            whole.start(),
            PartialRef {
                name: name.as_str().to_string(),
                callable: caps.get(2).is_some(),
            },
        ));
    }
    for caps in BRACKET_REF.captures_iter(text) {
        let Some(whole) = caps.get(0) else { continue };
        let Some(name) = caps.get(1).or_else(|| caps.get(2)) else {
            continue;
        };
        let name = name.as_str().trim();
        if name.is_empty() {
            continue;
        }
        found.push((
            whole.start(),
            PartialRef {
                name: name.to_string(),
                callable: caps.get(3).is_some(),
            },
        ));
    }
    found.sort_by_key(|(pos, _)| *pos);
    found.into_iter().map(|(_, r)| r).collect()
}

/// Picks the layout for a page; first match wins:
/// explicit front matter layout, index layout, nearest `_layout.eta`
/// walking up to `src_dir`, then the root layout.
fn resolve_layout(page: &Page, src_dir: &Path, page_dir: &Path) -> Option<PathBuf> {
    if let Some(name) = page.front_matter.layout() {
        let candidate = normalize_path(&src_dir.join(layout_file_name(name)));
        if candidate.is_file() {
            return Some(candidate);
        }
        tracing::warn!(
            layout = name,
            path = %candidate.display(),
            "declared layout not found, falling back to conventional layouts"
        );
    }

    if page.is_index() {
        let candidate = page_dir.join(INDEX_LAYOUT_FILE);
        if candidate.is_file() {
            return Some(candidate);
        }
    }

    let mut chain = chain_down(src_dir, page_dir);
    chain.reverse();
    chain
        .into_iter()
        .map(|dir| dir.join(LAYOUT_FILE))
        .find(|candidate| candidate.is_file())
        .or_else(|| {
            let root = src_dir.join(LAYOUT_FILE);
            root.is_file().then_some(root)
        })
}

fn layout_file_name(name: &str) -> String {
    let name = name.trim_start_matches('/');
    if Path::new(name).extension().is_some_and(|ext| ext == TEMPLATE_EXT) {
        name.to_string()
    } else {
        format!("{name}.{TEMPLATE_EXT}")
    }
}

/// Directories from `src_dir` down to `page_dir`, inclusive. A page outside
/// the source tree only sees `src_dir`.
fn chain_down(src_dir: &Path, page_dir: &Path) -> Vec<PathBuf> {
    let mut chain = vec![src_dir.to_path_buf()];
    if let Ok(rel) = page_dir.strip_prefix(src_dir) {
        let mut current = src_dir.to_path_buf();
        for component in rel.components() {
            current.push(component);
            chain.push(current.clone());
        }
    }
    chain
}

/// Immediate subdirectories of `dir` whose names start with `_`, sorted.
fn underscore_dirs(dir: &Path) -> Result<Vec<PathBuf>, IsgError> {
    let entries = match std::fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => {
            return Err(IsgError::Io {
                path: dir.to_path_buf(),
                source: e,
            })
        }
    };

    let mut dirs = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|e| IsgError::Io {
            path: dir.to_path_buf(),
            source: e,
        })?;
        let path = entry.path();
        if entry.file_name().to_string_lossy().starts_with('_') && path.is_dir() {
            dirs.push(path);
        }
    }
    dirs.sort();
    Ok(dirs)
}

/// All `*.eta` files below `dir`, at any depth.
fn glob_templates(dir: &Path) -> Result<Vec<PathBuf>, IsgError> {
    let pattern = format!(
        "{}/**/*.{TEMPLATE_EXT}",
        glob::Pattern::escape(&to_slash(dir))
    );
    let paths = glob::glob(&pattern).map_err(|e| IsgError::PartialPattern {
        pattern: pattern.clone(),
        reason: e.msg.to_string(),
    })?;

    let mut files = Vec::new();
    for path in paths {
        let path = path.map_err(|e| {
            let path = e.path().to_path_buf();
            IsgError::Io {
                path,
                source: e.into(),
            }
        })?;
        if path.is_file() {
            files.push(normalize_path(&path));
        }
    }
    Ok(files)
}

/// Folds `.` and `..` components lexically, without touching the filesystem.
pub fn normalize_path(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => match out.components().next_back() {
                Some(Component::Normal(_)) => {
                    out.pop();
                }
                Some(Component::RootDir | Component::Prefix(_)) => {}
                _ => out.push(".."),
            },
            other => out.push(other.as_os_str()),
        }
    }
    out
}

/// Renders a path with `/` separators.
pub fn to_slash(path: &Path) -> String {
    path.to_string_lossy().replace('\\', "/")
}

fn absolute_normalized(path: &Path) -> Result<PathBuf, IsgError> {
    let absolute = std::path::absolute(path).map_err(|e| IsgError::Io {
        path: path.to_path_buf(),
        source: e,
    })?;
    Ok(normalize_path(&absolute))
}

fn read_lock<T>(lock: &RwLock<T>) -> RwLockReadGuard<'_, T> {
    lock.read().unwrap_or_else(PoisonError::into_inner)
}

fn write_lock<T>(lock: &RwLock<T>) -> RwLockWriteGuard<'_, T> {
    lock.write().unwrap_or_else(PoisonError::into_inner)
}
