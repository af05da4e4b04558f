// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

use async_trait::async_trait;
use std::net::IpAddr;

use crate::domain::cloud::{CloudError, HostResolver};

/// Resolver backed by the operating system's name service
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemHostResolver;

#[async_trait]
impl HostResolver for SystemHostResolver {
    async fn resolve(&self, host: &str) -> Result<Vec<IpAddr>, CloudError> {
        let addrs: Vec<IpAddr> = tokio::net::lookup_host((host, 0))
            .await
            .map_err(|_| CloudError::Unresolved(host.to_string()))?
            .map(|addr| addr.ip())
            .collect();

        if addrs.is_empty() {
            return Err(CloudError::Unresolved(host.to_string()));
        }
        Ok(addrs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_resolves_literal_address() {
        let addrs = SystemHostResolver.resolve("127.0.0.1").await.unwrap();
        assert_eq!(addrs, vec!["127.0.0.1".parse::<IpAddr>().unwrap()]);
    }

    #[tokio::test]
    async fn test_invalid_name_is_unresolved() {
        let err = SystemHostResolver.resolve("no such host.invalid").await.unwrap_err();
        assert!(matches!(err, CloudError::Unresolved(_)));
    }
}
