// Copyright (C) 2026 The hostloc Contributors
//
// This program is free software: you can redistribute it and/or modify it under
// the terms of the GNU General Public License as published by the Free Software
// Foundation, version 3.
//
// This program is distributed in the hope that it will be useful, but WITHOUT
// ANY WARRANTY; without even the implied warranty of MERCHANTABILITY or FITNESS
// FOR A PARTICULAR PURPOSE. See the GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License along with
// this program. If not, see <https://www.gnu.org/licenses/>.
//

//! Orchestration glue: cache lookup, rate-aware provider selection, the
//! external fetch, and cache population. The core itself never touches a
//! socket — DNS and HTTP are injected traits so the concurrent primitives
//! stay testable without a network.

use crate::provider_iterator::ProviderIterator;
use crate::ttl_cache::TTLCache;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ResolveError {
    #[error("dns lookup failed for {host}: {source}")]
    LookupError {
        host: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },
    #[error("no provider available under its configured rate")]
    NoProviderAvailable,
    #[error("provider {provider} request failed: {source}")]
    ProviderError {
        provider: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },
    #[error("provider {provider} response could not be parsed: {reason}")]
    ParseError { provider: String, reason: String },
}

/// DNS resolution, injected so the resolver core never opens a socket.
pub trait Dns: Send + Sync {
    fn resolve(
        &self,
        host: &str,
    ) -> Result<String, Box<dyn std::error::Error + Send + Sync>>;
}

/// One provider request/response round trip, injected for the same reason.
pub trait ProviderClient: Send + Sync {
    fn fetch_country(
        &self,
        provider_name: &str,
        address: &str,
    ) -> Result<String, Box<dyn std::error::Error + Send + Sync>>;
}

pub struct Resolver<D, P> {
    dns: D,
    provider_client: P,
    cache: Arc<TTLCache>,
    iterator: Arc<ProviderIterator>,
}

impl<D: Dns, P: ProviderClient> Resolver<D, P> {
    pub fn new(
        dns: D,
        provider_client: P,
        cache: Arc<TTLCache>,
        iterator: Arc<ProviderIterator>,
    ) -> Self {
        Self {
            dns,
            provider_client,
            cache,
            iterator,
        }
    }

    pub fn resolve(&self, host: &str) -> Result<String, ResolveError> {
        let address = self
            .dns
            .resolve(host)
            .map_err(|source| ResolveError::LookupError {
                host: host.to_string(),
                source,
            })?;

        if let Some(country) = self.cache.get(&address) {
            return Ok(country);
        }

        let now_s = now_s();
        let provider = self
            .iterator
            .next(now_s)
            .ok_or(ResolveError::NoProviderAvailable)?
            .to_string();

        let country = self
            .provider_client
            .fetch_country(&provider, &address)
            .map_err(|source| ResolveError::ProviderError {
                provider: provider.clone(),
                source,
            })?;

        self.cache.insert(&address, country.clone());
        Ok(country)
    }
}

fn now_s() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("system clock is before the unix epoch")
        .as_secs() as i64
}

/// Walks a JSON body along a dotted field-name path, requiring an object at
/// every step but the last and a string leaf at the end. Shared by
/// `hostloc-server`'s provider client and exercised here against the
/// in-core error taxonomy.
pub fn walk_scheme(body: &serde_json::Value, scheme: &[String], provider: &str) -> Result<String, ResolveError> {
    let mut cursor = body;
    for (depth, field) in scheme.iter().enumerate() {
        let obj = cursor
            .as_object()
            .ok_or_else(|| ResolveError::ParseError {
                provider: provider.to_string(),
                reason: format!("expected object at depth {depth}, field {field:?}"),
            })?;
        cursor = obj.get(field).ok_or_else(|| ResolveError::ParseError {
            provider: provider.to_string(),
            reason: format!("missing field {field:?} at depth {depth}"),
        })?;
    }
    cursor
        .as_str()
        .map(str::to_string)
        .ok_or_else(|| ResolveError::ParseError {
            provider: provider.to_string(),
            reason: "scheme leaf is not a string".to_string(),
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::provider_iterator::ProviderSpec;
    use crate::rate_window::BlockPool;
    use std::sync::Mutex;
    use std::time::Duration;

    struct StaticDns(&'static str);
    impl Dns for StaticDns {
        fn resolve(&self, _host: &str) -> Result<String, Box<dyn std::error::Error + Send + Sync>> {
            Ok(self.0.to_string())
        }
    }

    struct FailingDns;
    impl Dns for FailingDns {
        fn resolve(&self, _host: &str) -> Result<String, Box<dyn std::error::Error + Send + Sync>> {
            Err("no such host".into())
        }
    }

    struct StubProvider {
        calls: Mutex<Vec<(String, String)>>,
        country: &'static str,
    }

    impl ProviderClient for StubProvider {
        fn fetch_country(
            &self,
            provider_name: &str,
            address: &str,
        ) -> Result<String, Box<dyn std::error::Error + Send + Sync>> {
            self.calls
                .lock()
                .unwrap()
                .push((provider_name.to_string(), address.to_string()));
            Ok(self.country.to_string())
        }
    }

    fn cache() -> Arc<TTLCache> {
        Arc::new(TTLCache::with_clock(
            Duration::from_secs(300),
            4,
            Arc::new(ManualClock::new(0)),
        ))
    }

    fn iterator(max_per_minute: i64) -> Arc<ProviderIterator> {
        Arc::new(ProviderIterator::new(
            vec![ProviderSpec {
                name: "geo-a".to_string(),
                max_per_minute,
            }],
            Arc::new(BlockPool::new()),
            0,
        ))
    }

    #[test]
    fn lookup_failure_surfaces_lookup_error() {
        let resolver = Resolver::new(FailingDns, StubProvider { calls: Mutex::new(vec![]), country: "US" }, cache(), iterator(100));
        let err = resolver.resolve("bad.example").unwrap_err();
        assert!(matches!(err, ResolveError::LookupError { .. }));
    }

    #[test]
    fn cache_hit_skips_the_provider_entirely() {
        let c = cache();
        c.insert("93.184.216.34", "US");
        let provider = StubProvider { calls: Mutex::new(vec![]), country: "DE" };
        let resolver = Resolver::new(StaticDns("93.184.216.34"), provider, c, iterator(100));
        let country = resolver.resolve("example.com").unwrap();
        assert_eq!(country, "US");
    }

    #[test]
    fn miss_fetches_from_provider_and_populates_cache() {
        let c = cache();
        let provider = StubProvider { calls: Mutex::new(vec![]), country: "FR" };
        let resolver = Resolver::new(StaticDns("1.2.3.4"), provider, Arc::clone(&c), iterator(100));
        let country = resolver.resolve("example.com").unwrap();
        assert_eq!(country, "FR");
        assert_eq!(c.get("1.2.3.4"), Some("FR".to_string()));
    }

    #[test]
    fn exhausted_providers_surface_no_provider_available() {
        let c = cache();
        let provider = StubProvider { calls: Mutex::new(vec![]), country: "FR" };
        let resolver = Resolver::new(StaticDns("1.2.3.4"), provider, c, iterator(0));
        let err = resolver.resolve("example.com").unwrap_err();
        assert!(matches!(err, ResolveError::NoProviderAvailable));
    }

    #[test]
    fn scheme_walk_reads_nested_string_field() {
        let body: serde_json::Value =
            serde_json::from_str(r#"{"location": {"country": "US"}}"#).unwrap();
        let scheme = vec!["location".to_string(), "country".to_string()];
        assert_eq!(walk_scheme(&body, &scheme, "geo-a").unwrap(), "US");
    }

    #[test]
    fn scheme_walk_reports_missing_field() {
        let body: serde_json::Value = serde_json::from_str(r#"{"location": {}}"#).unwrap();
        let scheme = vec!["location".to_string(), "country".to_string()];
        let err = walk_scheme(&body, &scheme, "geo-a").unwrap_err();
        assert!(matches!(err, ResolveError::ParseError { .. }));
    }

    #[test]
    fn scheme_walk_reports_non_string_leaf() {
        let body: serde_json::Value = serde_json::from_str(r#"{"country": 42}"#).unwrap();
        let scheme = vec!["country".to_string()];
        let err = walk_scheme(&body, &scheme, "geo-a").unwrap_err();
        assert!(matches!(err, ResolveError::ParseError { .. }));
    }
}
