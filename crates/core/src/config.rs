//! Configuration for cluster connections and index naming
//!
//! A [`Configuration`] names the namespace that prefixes every alias and
//! physical index owned by this process, and maps logical cluster names to
//! engine hosts. It can be built in code or parsed from TOML:
//!
//! ```toml
//! namespace = "shop"
//!
//! [clusters]
//! default = "http://localhost:9200"
//! analytics = "http://analytics:9200"
//! ```

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

/// Namespace used when none is configured.
pub const DEFAULT_NAMESPACE: &str = "elastic";

/// Name of the cluster every unknown cluster name falls back to.
pub const DEFAULT_CLUSTER: &str = "default";

/// Environment variable holding the default cluster's host.
pub const HOST_ENV_VAR: &str = "ELASTICSEARCH_URL";

/// Cluster and naming configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Configuration {
    /// Prefix shared by all aliases and indices of this process
    #[serde(default = "default_namespace")]
    namespace: String,
    /// Logical cluster name -> engine host
    #[serde(default = "default_clusters")]
    clusters: BTreeMap<String, Option<String>>,
}

fn default_namespace() -> String {
    DEFAULT_NAMESPACE.to_string()
}

fn default_clusters() -> BTreeMap<String, Option<String>> {
    BTreeMap::from([(DEFAULT_CLUSTER.to_string(), std::env::var(HOST_ENV_VAR).ok())])
}

impl Default for Configuration {
    fn default() -> Self {
        Self {
            namespace: default_namespace(),
            clusters: default_clusters(),
        }
    }
}

impl Configuration {
    /// Configuration with the default namespace and the default cluster
    /// taken from `ELASTICSEARCH_URL`.
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse configuration from a TOML document.
    ///
    /// # Errors
    ///
    /// Returns an error if the document cannot be parsed or the namespace is
    /// blank.
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: Configuration = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Read and parse configuration from a file path.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    /// The configured namespace
    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    /// Replace the namespace.
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidConfig` if `namespace` is empty or whitespace.
    pub fn set_namespace(&mut self, namespace: impl Into<String>) -> Result<()> {
        let namespace = namespace.into();
        validate_namespace(&namespace)?;
        self.namespace = namespace;
        Ok(())
    }

    /// Builder form of [`set_namespace`](Self::set_namespace)
    pub fn with_namespace(mut self, namespace: impl Into<String>) -> Result<Self> {
        self.set_namespace(namespace)?;
        Ok(self)
    }

    /// All configured clusters
    pub fn clusters(&self) -> &BTreeMap<String, Option<String>> {
        &self.clusters
    }

    /// Replace the whole cluster table
    pub fn set_clusters(&mut self, clusters: BTreeMap<String, Option<String>>) {
        self.clusters = clusters;
    }

    /// Add or replace one cluster
    pub fn with_cluster(mut self, name: impl Into<String>, host: impl Into<String>) -> Self {
        self.clusters.insert(name.into(), Some(host.into()));
        self
    }

    /// Host for `cluster`, falling back to the default cluster when the name
    /// is unknown or has no host.
    pub fn host(&self, cluster: &str) -> Option<&str> {
        self.clusters
            .get(cluster)
            .and_then(|h| h.as_deref())
            .or_else(|| {
                self.clusters
                    .get(DEFAULT_CLUSTER)
                    .and_then(|h| h.as_deref())
            })
    }

    /// Wildcard pattern matching every index in the namespace
    pub fn index_pattern(&self) -> String {
        format!("{}-*", self.namespace)
    }

    fn validate(&self) -> Result<()> {
        validate_namespace(&self.namespace)
    }
}

fn validate_namespace(namespace: &str) -> Result<()> {
    if namespace.trim().is_empty() {
        return Err(Error::invalid_config("namespace can't be blank"));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_default_namespace() {
        let config = Configuration::new();
        assert_eq!(config.namespace(), "elastic");
    }

    #[test]
    fn test_has_default_cluster() {
        let config = Configuration::new();
        assert!(config.clusters().contains_key(DEFAULT_CLUSTER));
    }

    #[test]
    fn test_configures_namespace() {
        let mut config = Configuration::new();
        config.set_namespace("namespace").unwrap();
        assert_eq!(config.namespace(), "namespace");
    }

    #[test]
    fn test_rejects_blank_namespace() {
        let mut config = Configuration::new();
        assert!(matches!(
            config.set_namespace(""),
            Err(Error::InvalidConfig { .. })
        ));
        assert!(config.set_namespace("   ").is_err());
        assert_eq!(config.namespace(), "elastic");
    }

    #[test]
    fn test_host_falls_back_to_default() {
        let config = Configuration::new()
            .with_cluster("default", "http://default:9200")
            .with_cluster("foo", "http://foo:9200");

        assert_eq!(config.host("foo"), Some("http://foo:9200"));
        assert_eq!(config.host("default"), Some("http://default:9200"));
        assert_eq!(config.host("unknown"), Some("http://default:9200"));
    }

    #[test]
    fn test_index_pattern() {
        let config = Configuration::new().with_namespace("shop").unwrap();
        assert_eq!(config.index_pattern(), "shop-*");
    }

    #[test]
    fn test_from_toml_str() {
        let config = Configuration::from_toml_str(
            r#"
namespace = "shop"

[clusters]
default = "http://localhost:9200"
analytics = "http://analytics:9200"
"#,
        )
        .unwrap();

        assert_eq!(config.namespace(), "shop");
        assert_eq!(config.host("analytics"), Some("http://analytics:9200"));
        assert_eq!(config.host("other"), Some("http://localhost:9200"));
    }

    #[test]
    fn test_from_toml_str_defaults_missing_keys() {
        let config = Configuration::from_toml_str("").unwrap();
        assert_eq!(config.namespace(), DEFAULT_NAMESPACE);
        assert!(config.clusters().contains_key(DEFAULT_CLUSTER));
    }

    #[test]
    fn test_from_toml_str_rejects_blank_namespace() {
        let result = Configuration::from_toml_str(r#"namespace = """#);
        assert!(matches!(result, Err(Error::InvalidConfig { .. })));
    }

    #[test]
    fn test_from_toml_str_rejects_garbage() {
        let result = Configuration::from_toml_str("namespace = [");
        assert!(matches!(result, Err(Error::Serialization { .. })));
    }

    #[test]
    fn test_from_file() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("elastic.toml");
        let mut file = std::fs::File::create(&path).unwrap();
        writeln!(file, "namespace = \"from-file\"").unwrap();

        let config = Configuration::from_file(&path).unwrap();
        assert_eq!(config.namespace(), "from-file");
    }

    #[test]
    fn test_from_missing_file() {
        let result = Configuration::from_file(Path::new("/nonexistent/elastic.toml"));
        assert!(matches!(result, Err(Error::Io(_))));
    }
}
