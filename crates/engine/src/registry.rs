//! Per-cluster client cache
//!
//! Ensures only one [`Client`] exists per logical cluster name. The registry
//! is an explicit value handed to whoever needs clients; there is no
//! process-global lookup.
//!
//! Uses parking_lot::Mutex so a panicking connector cannot poison the cache.

use crate::client::Client;
use crate::engine::SearchEngine;
use elastic_core::{Configuration, DEFAULT_CLUSTER};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tracing::info;

/// Builds an engine for a host (`None` when the cluster has no host configured)
pub type Connector = dyn Fn(Option<&str>) -> Arc<dyn SearchEngine> + Send + Sync;

/// Cache of one client per cluster name
pub struct ClientRegistry {
    configuration: Configuration,
    connector: Box<Connector>,
    clients: Mutex<HashMap<String, Arc<Client>>>,
}

impl fmt::Debug for ClientRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientRegistry")
            .field("configuration", &self.configuration)
            .field("clients", &self.clients.lock().len())
            .finish_non_exhaustive()
    }
}

impl ClientRegistry {
    /// Create a registry that connects through `connector`
    pub fn new<F>(configuration: Configuration, connector: F) -> Self
    where
        F: Fn(Option<&str>) -> Arc<dyn SearchEngine> + Send + Sync + 'static,
    {
        ClientRegistry {
            configuration,
            connector: Box::new(connector),
            clients: Mutex::new(HashMap::new()),
        }
    }

    /// The registry's configuration
    pub fn configuration(&self) -> &Configuration {
        &self.configuration
    }

    /// The configured namespace
    pub fn namespace(&self) -> &str {
        self.configuration.namespace()
    }

    /// Client for `cluster`, connecting on first use.
    ///
    /// Unknown cluster names connect to the default cluster's host but are
    /// cached under their own name.
    pub fn client(&self, cluster: &str) -> Arc<Client> {
        let mut clients = self.clients.lock();
        if let Some(client) = clients.get(cluster) {
            return Arc::clone(client);
        }

        let host = self.configuration.host(cluster);
        let client = Arc::new(Client::new((self.connector)(host)));
        clients.insert(cluster.to_string(), Arc::clone(&client));
        info!(target: "elastic::registry", cluster, host = ?host, "Client connected");
        client
    }

    /// Client for the default cluster
    pub fn default_client(&self) -> Arc<Client> {
        self.client(DEFAULT_CLUSTER)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryEngine;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn registry(connects: Arc<AtomicUsize>, hosts: Arc<Mutex<Vec<Option<String>>>>) -> ClientRegistry {
        let config = Configuration::new()
            .with_cluster("default", "http://default:9200")
            .with_cluster("foo", "http://foo:9200");
        ClientRegistry::new(config, move |host| {
            connects.fetch_add(1, Ordering::SeqCst);
            hosts.lock().push(host.map(str::to_string));
            Arc::new(MemoryEngine::new()) as Arc<dyn SearchEngine>
        })
    }

    #[test]
    fn test_client_is_cached_per_cluster() {
        let connects = Arc::new(AtomicUsize::new(0));
        let registry = registry(connects.clone(), Arc::new(Mutex::new(Vec::new())));

        let a = registry.client("default");
        let b = registry.default_client();
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(connects.load(Ordering::SeqCst), 1);

        let foo = registry.client("foo");
        assert!(!Arc::ptr_eq(&a, &foo));
        assert_eq!(connects.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_unknown_cluster_uses_default_host() {
        let hosts = Arc::new(Mutex::new(Vec::new()));
        let registry = registry(Arc::new(AtomicUsize::new(0)), hosts.clone());

        registry.client("foo");
        registry.client("unknown");

        assert_eq!(
            *hosts.lock(),
            vec![
                Some("http://foo:9200".to_string()),
                Some("http://default:9200".to_string())
            ]
        );
    }

    #[test]
    fn test_namespace_from_configuration() {
        let config = Configuration::new().with_namespace("shop").unwrap();
        let registry = ClientRegistry::new(config, |_| {
            Arc::new(MemoryEngine::new()) as Arc<dyn SearchEngine>
        });
        assert_eq!(registry.namespace(), "shop");
    }

    #[test]
    fn test_concurrent_first_use_connects_once() {
        let connects = Arc::new(AtomicUsize::new(0));
        let registry = Arc::new(registry(connects.clone(), Arc::new(Mutex::new(Vec::new()))));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let registry = Arc::clone(&registry);
                std::thread::spawn(move || registry.client("default"))
            })
            .collect();
        let clients: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();

        assert_eq!(connects.load(Ordering::SeqCst), 1);
        assert!(clients.windows(2).all(|w| Arc::ptr_eq(&w[0], &w[1])));
    }
}
