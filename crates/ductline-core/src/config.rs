//! Configuration for stream graph compilation.

use std::collections::HashMap;
use std::path::PathBuf;

/// Property key naming the DOT file written when graph construction fails.
pub const ERROR_DOT_FILE_PROPERTY: &str = "ductline.stream.error.dotfile";

/// Environment variable consulted by [`StreamGraphConfig::from_env`].
pub const ERROR_DOT_FILE_ENV: &str = "DUCTLINE_ERROR_DOT_FILE";

/// Configuration for a [`StreamGraph`](crate::stream::StreamGraph) instance.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StreamGraphConfig {
    /// Where to dump the graph on construction failure (`None` = no dump).
    pub error_dot_file: Option<PathBuf>,
}

impl StreamGraphConfig {
    /// Builds a config from flow properties.
    ///
    /// Unknown keys are ignored; an empty value disables the dump.
    #[must_use]
    pub fn from_properties(properties: &HashMap<String, String>) -> Self {
        let error_dot_file = properties
            .get(ERROR_DOT_FILE_PROPERTY)
            .filter(|path| !path.trim().is_empty())
            .map(PathBuf::from);
        Self { error_dot_file }
    }

    /// Builds a config from the process environment.
    #[must_use]
    pub fn from_env() -> Self {
        let error_dot_file = std::env::var_os(ERROR_DOT_FILE_ENV)
            .filter(|path| !path.is_empty())
            .map(PathBuf::from);
        Self { error_dot_file }
    }

    /// Sets the error dump path.
    #[must_use]
    pub fn with_error_dot_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.error_dot_file = Some(path.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_has_no_dump_path() {
        assert!(StreamGraphConfig::default().error_dot_file.is_none());
    }

    #[test]
    fn test_from_properties() {
        let mut props = HashMap::new();
        props.insert(ERROR_DOT_FILE_PROPERTY.to_string(), "/tmp/g.dot".to_string());
        props.insert("unrelated".to_string(), "x".to_string());
        let config = StreamGraphConfig::from_properties(&props);
        assert_eq!(config.error_dot_file, Some(PathBuf::from("/tmp/g.dot")));
    }

    #[test]
    fn test_blank_property_disables_dump() {
        let mut props = HashMap::new();
        props.insert(ERROR_DOT_FILE_PROPERTY.to_string(), "  ".to_string());
        assert!(StreamGraphConfig::from_properties(&props)
            .error_dot_file
            .is_none());
    }
}
