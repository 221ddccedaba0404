//! Error types for ISG cache operations.

use std::path::PathBuf;

/// Errors that can occur during ISG cache operations.
///
/// Most cache operations are fail-safe: missing files, unreadable templates
/// and corrupt manifests degrade to cache misses rather than errors. This enum
/// covers what is left: conditions a build must not paper over.
#[derive(Debug, thiserror::Error)]
pub enum IsgError {
    /// A template references itself, directly or through other partials.
    #[error("circular template dependency: {}", format_chain(chain))]
    CircularDependency {
        /// The expansion path, ending with the template that closed the cycle.
        chain: Vec<PathBuf>,
    },

    /// A filesystem operation failed for a reason other than absence.
    #[error("cache I/O error at {path}: {source}")]
    Io {
        /// The path that caused the error.
        path: PathBuf,
        /// The underlying I/O error.
        source: std::io::Error,
    },

    /// The glob used to search a partials directory could not be built.
    #[error("invalid partial search pattern '{pattern}': {reason}")]
    PartialPattern {
        /// The rejected pattern.
        pattern: String,
        /// Description of the problem.
        reason: String,
    },

    /// A serialization or deserialization error occurred.
    #[error("serialization error: {reason}")]
    Serialization {
        /// Description of the serialization failure.
        reason: String,
    },
}

impl IsgError {
    /// Returns `true` for errors that must stop processing of the page.
    ///
    /// Only circular dependencies qualify; rebuild decisions treat every other
    /// tracking failure as a cache miss.
    pub fn is_fatal(&self) -> bool {
        matches!(self, IsgError::CircularDependency { .. })
    }
}

fn format_chain(chain: &[PathBuf]) -> String {
    chain
        .iter()
        .map(|p| p.display().to_string())
        .collect::<Vec<_>>()
        .join(" -> ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn circular_dependency_display() {
        let err = IsgError::CircularDependency {
            chain: vec![
                PathBuf::from("/src/_layout.eta"),
                PathBuf::from("/src/_partials/a.eta"),
                PathBuf::from("/src/_partials/a.eta"),
            ],
        };
        let msg = err.to_string();
        assert!(msg.starts_with("circular template dependency"));
        assert!(msg.contains("/src/_layout.eta -> /src/_partials/a.eta -> /src/_partials/a.eta"));
        assert!(err.is_fatal());
    }

    #[test]
    fn io_error_display() {
        let err = IsgError::Io {
            path: PathBuf::from("/tmp/cache/manifest.json"),
            source: std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied"),
        };
        let msg = err.to_string();
        assert!(msg.contains("cache I/O error"));
        assert!(msg.contains("manifest.json"));
        assert!(!err.is_fatal());
    }

    #[test]
    fn partial_pattern_display() {
        let err = IsgError::PartialPattern {
            pattern: "/src/[_x/**/*.eta".to_string(),
            reason: "invalid range pattern".to_string(),
        };
        assert!(err.to_string().contains("invalid range pattern"));
        assert!(!err.is_fatal());
    }

    #[test]
    fn serialization_error_display() {
        let err = IsgError::Serialization {
            reason: "key must be a string".to_string(),
        };
        assert!(err.to_string().contains("key must be a string"));
    }
}
