//! Connection provisioning and scoped release.
//!
//! [`ConnectionProvider`] turns an immutable [`ClientConfig`] into
//! per-invocation [`ConnectionHandle`]s. Construction is cheap and may happen
//! once per pipeline invocation; the handle owns the underlying transport and
//! must be released exactly once per acquisition, on every exit path. Release
//! is idempotent so cleanup paths can call it unconditionally.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use serde_json::{Map, Value};
use tracing::warn;

use crate::config::ClientConfig;
use crate::document::Document;
use crate::driver::{DatabaseDriver, DocumentCursor};
use crate::error::{ClientError, ClientResult};
use crate::http::HttpDriver;

/// Source of fresh connection handles, one per pipeline invocation.
///
/// Implemented by [`ConnectionProvider`] for real deployments and by
/// `Arc<InMemoryDriver>` for tests.
pub trait ConnectionFactory: Send + Sync {
    /// Builds a new connection handle.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::Configuration`] if the configuration cannot be
    /// turned into a transport, or [`ClientError::Connection`] if transport
    /// construction fails.
    fn connect(&self) -> ClientResult<ConnectionHandle>;
}

/// Builds connection handles from an immutable configuration.
#[derive(Debug, Clone)]
pub struct ConnectionProvider {
    config: Arc<ClientConfig>,
}

impl ConnectionProvider {
    /// Creates a provider, validating configuration invariants.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::Configuration`] if the endpoint list is empty
    /// or authentication is enabled with empty credentials.
    pub fn new(config: ClientConfig) -> ClientResult<Self> {
        if config.endpoints.is_empty() {
            return Err(ClientError::Configuration(
                "at least one coordinator endpoint is required".into(),
            ));
        }
        if let Some(auth) = &config.auth {
            if auth.username.is_empty() || auth.password.is_empty() {
                return Err(ClientError::Configuration(
                    "authentication is enabled but username or password is empty".into(),
                ));
            }
        }
        Ok(Self {
            config: Arc::new(config),
        })
    }

    /// Returns the shared configuration.
    #[must_use]
    pub fn config(&self) -> &ClientConfig {
        &self.config
    }
}

impl ConnectionFactory for ConnectionProvider {
    fn connect(&self) -> ClientResult<ConnectionHandle> {
        let driver = HttpDriver::new(Arc::clone(&self.config))?;
        Ok(ConnectionHandle::new(Arc::new(driver)))
    }
}

/// A live connection owned by exactly one pipeline invocation.
///
/// The handle wraps the driver and tracks release state. After
/// [`release`](Self::release) every operation fails with
/// [`ClientError::Closed`]; releasing again is a no-op.
pub struct ConnectionHandle {
    driver: Arc<dyn DatabaseDriver>,
    released: AtomicBool,
}

impl ConnectionHandle {
    /// Wraps a driver in a handle.
    #[must_use]
    pub fn new(driver: Arc<dyn DatabaseDriver>) -> Self {
        Self {
            driver,
            released: AtomicBool::new(false),
        }
    }

    /// Executes a query through the underlying driver.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::Closed`] after release, otherwise propagates
    /// driver errors.
    pub async fn query(
        &self,
        database: &str,
        query: &str,
        bind_vars: &Map<String, Value>,
    ) -> ClientResult<Box<dyn DocumentCursor>> {
        self.driver()?.query(database, query, bind_vars).await
    }

    /// Inserts a document through the underlying driver.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::Closed`] after release, otherwise propagates
    /// driver errors.
    pub async fn insert(
        &self,
        database: &str,
        collection: &str,
        document: &Document,
    ) -> ClientResult<()> {
        self.driver()?.insert(database, collection, document).await
    }

    /// Releases the connection, shutting the transport down.
    ///
    /// Idempotent: only the first call reaches the driver. Synchronous so it
    /// can run from any cleanup path, including `Drop` when an invocation is
    /// cancelled between items.
    pub fn release(&self) {
        if !self.released.swap(true, Ordering::SeqCst) {
            self.driver.close();
        }
    }

    /// Returns `true` once the handle has been released.
    #[must_use]
    pub fn is_released(&self) -> bool {
        self.released.load(Ordering::SeqCst)
    }

    fn driver(&self) -> ClientResult<&Arc<dyn DatabaseDriver>> {
        if self.is_released() {
            return Err(ClientError::Closed);
        }
        Ok(&self.driver)
    }
}

impl Drop for ConnectionHandle {
    fn drop(&mut self) {
        // The scoped-acquisition discipline releases explicitly on every
        // path; reaching this without a release means the invocation was
        // cancelled or a cleanup path was missed. Release anyway.
        if !self.is_released() {
            warn!("connection handle dropped without release");
            self.release();
        }
    }
}

impl std::fmt::Debug for ConnectionHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionHandle")
            .field("released", &self.is_released())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ConnectionOptions, Credentials};
    use crate::memory::InMemoryDriver;

    fn no_auth_config(hosts: &str) -> ClientConfig {
        let options = ConnectionOptions::new()
            .with_option("arango.hosts", hosts)
            .with_option("arango.auth.enabled", "false");
        ClientConfig::from_options(&options).unwrap()
    }

    #[test]
    fn test_provider_rejects_empty_endpoints() {
        let config = ClientConfig::default();
        assert!(ConnectionProvider::new(config).is_err());
    }

    #[test]
    fn test_provider_rejects_empty_credentials() {
        let mut config = no_auth_config("db1:8529");
        config.auth = Some(Credentials {
            username: "root".into(),
            password: String::new(),
        });
        assert!(ConnectionProvider::new(config).is_err());
    }

    #[test]
    fn test_connect_is_cheap_and_repeatable() {
        let provider = ConnectionProvider::new(no_auth_config("db1:8529,db2:8529")).unwrap();
        for _ in 0..3 {
            let handle = provider.connect().unwrap();
            assert!(!handle.is_released());
            handle.release();
        }
    }

    #[test]
    fn test_release_is_idempotent() {
        let driver = Arc::new(InMemoryDriver::new());
        let handle = ConnectionHandle::new(Arc::clone(&driver) as Arc<dyn DatabaseDriver>);

        handle.release();
        handle.release();

        assert!(handle.is_released());
        assert_eq!(driver.close_count(), 1);
    }

    #[test]
    fn test_drop_releases_as_fallback() {
        let driver = Arc::new(InMemoryDriver::new());
        {
            let _handle = ConnectionHandle::new(Arc::clone(&driver) as Arc<dyn DatabaseDriver>);
        }
        assert_eq!(driver.close_count(), 1);
    }

    #[tokio::test]
    async fn test_operations_fail_after_release() {
        let driver = Arc::new(InMemoryDriver::new());
        let handle = ConnectionHandle::new(driver as Arc<dyn DatabaseDriver>);
        handle.release();

        let err = handle
            .query("db", "RETURN 1", &Map::new())
            .await
            .unwrap_err();
        assert!(matches!(err, ClientError::Closed));
    }
}
