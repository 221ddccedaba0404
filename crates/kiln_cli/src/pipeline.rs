//! Shared helpers for CLI commands: project root discovery and config loading.

use std::path::{Path, PathBuf};

use kiln_config::{load_config, load_config_from_str, SiteConfig, CONFIG_FILE};

use crate::GlobalArgs;

/// Walks up from `start` looking for the nearest directory containing `kiln.toml`.
///
/// Returns the directory containing `kiln.toml`, or an error if none is found.
pub fn find_project_root(start: &Path) -> Result<PathBuf, Box<dyn std::error::Error>> {
    let mut current = start.to_path_buf();
    loop {
        if current.join(CONFIG_FILE).exists() {
            return Ok(current);
        }
        if !current.pop() {
            return Err(format!(
                "could not find {CONFIG_FILE} in {} or any parent directory",
                start.display()
            )
            .into());
        }
    }
}

/// Resolves the project root directory from global CLI args.
///
/// If `--config` is specified, uses that path (file → parent dir, dir → itself).
/// Otherwise walks up from the current directory looking for `kiln.toml`.
pub fn resolve_project_root(global: &GlobalArgs) -> Result<PathBuf, Box<dyn std::error::Error>> {
    if let Some(ref config_path) = global.config {
        let p = PathBuf::from(config_path);
        if p.is_file() {
            Ok(p.parent()
                .map(|p| p.to_path_buf())
                .unwrap_or_else(|| PathBuf::from(".")))
        } else {
            Ok(p)
        }
    } else {
        find_project_root(&std::env::current_dir()?)
    }
}

/// Loads the site configuration, with relative paths resolved against the
/// project root.
///
/// A `--config` file is read as-is, whatever its name.
pub fn load_project(global: &GlobalArgs) -> Result<(PathBuf, SiteConfig), Box<dyn std::error::Error>> {
    let root = resolve_project_root(global)?;
    match global.config.as_deref().map(Path::new) {
        Some(file) if file.is_file() => {
            let text = std::fs::read_to_string(file)?;
            let mut config = load_config_from_str(&text)?;
            config.resolve_paths(&root);
            Ok((root, config))
        }
        _ => {
            let config = load_config(&root)?;
            Ok((root, config))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn global(config: Option<&Path>) -> GlobalArgs {
        GlobalArgs {
            quiet: true,
            verbose: false,
            config: config.map(|p| p.display().to_string()),
        }
    }

    #[test]
    fn find_project_root_in_current_dir() {
        let tmp = TempDir::new().unwrap();
        fs::write(tmp.path().join("kiln.toml"), "[site]\nsrc_dir = \"src\"\n").unwrap();
        let root = find_project_root(tmp.path()).unwrap();
        assert_eq!(root, tmp.path());
    }

    #[test]
    fn find_project_root_in_parent() {
        let tmp = TempDir::new().unwrap();
        fs::write(tmp.path().join("kiln.toml"), "").unwrap();
        let sub = tmp.path().join("src").join("blog");
        fs::create_dir_all(&sub).unwrap();
        let root = find_project_root(&sub).unwrap();
        assert_eq!(root, tmp.path());
    }

    #[test]
    fn find_project_root_not_found() {
        let tmp = TempDir::new().unwrap();
        let result = find_project_root(tmp.path());
        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("kiln.toml"));
    }

    #[test]
    fn resolve_root_from_config_file() {
        let tmp = TempDir::new().unwrap();
        let file = tmp.path().join("kiln.toml");
        fs::write(&file, "").unwrap();
        assert_eq!(resolve_project_root(&global(Some(&file))).unwrap(), tmp.path());
        assert_eq!(
            resolve_project_root(&global(Some(tmp.path()))).unwrap(),
            tmp.path()
        );
    }

    #[test]
    fn load_project_resolves_paths() {
        let tmp = TempDir::new().unwrap();
        let file = tmp.path().join("staging.toml");
        fs::write(&file, "[site]\nsrc_dir = \"content\"\ncache_dir = \"cache\"\n").unwrap();

        let (root, config) = load_project(&global(Some(&file))).unwrap();
        assert_eq!(root, tmp.path());
        assert_eq!(config.src_dir(), Some(tmp.path().join("content").as_path()));
        assert_eq!(config.cache_dir(), tmp.path().join("cache"));
    }

    #[test]
    fn load_project_from_directory() {
        let tmp = TempDir::new().unwrap();
        fs::write(tmp.path().join("kiln.toml"), "[isg]\nttl_seconds = 60\n").unwrap();
        let (_, config) = load_project(&global(Some(tmp.path()))).unwrap();
        assert_eq!(config.isg.ttl_seconds, 60);
    }
}
