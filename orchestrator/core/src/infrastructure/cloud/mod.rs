// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Cloud Infrastructure Module
//!
//! Concrete implementations of the DNS, object storage and resolver
//! boundaries, plus the factory selecting one from configuration.

pub mod memory;
pub mod resolver;

pub use memory::{InMemoryCloud, StaticHostResolver};
pub use resolver::SystemHostResolver;

use std::sync::Arc;
use tracing::warn;

use crate::domain::cloud::CloudConnector;
use crate::domain::installer_config::CloudBackend;

/// Factory function to create the cloud connector from configuration
pub fn create_cloud_connector(backend: CloudBackend) -> Arc<dyn CloudConnector> {
    if backend.is_simulated() {
        warn!(
            ?backend,
            "Cloud backend is simulated; teardown will not reach any real DNS zone or bucket"
        );
    }
    match backend {
        CloudBackend::Memory => Arc::new(InMemoryCloud::new()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::cloud::CloudCredentials;

    #[test]
    fn test_memory_backend_is_simulated() {
        assert!(CloudBackend::Memory.is_simulated());
        assert!(CloudBackend::default().is_simulated());
    }

    #[tokio::test]
    async fn test_factory_memory() {
        let connector = create_cloud_connector(CloudBackend::Memory);
        let creds = CloudCredentials {
            access_key: "AKIA".to_string(),
            secret_key: "secret".to_string(),
            region: "us-east-1".to_string(),
        };

        let dns = connector.dns(&creds).expect("dns client");
        assert!(dns.find_zone("missing.example.com.").await.unwrap().is_none());
        assert!(connector.storage(&creds).is_ok());
    }
}
