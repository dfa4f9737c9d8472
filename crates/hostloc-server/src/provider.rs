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

//! A `reqwest`-backed implementation of `hostloc_core::ProviderClient`.
//!
//! Holds one configured [`ProviderConfig`](crate::config::ProviderConfig)
//! per provider name, substitutes the resolved address into its
//! `url_pattern`, issues the request, and walks the JSON body with
//! `hostloc_core::walk_scheme`.

use crate::config::ProviderConfig;
use hostloc_core::{walk_scheme, ProviderClient};
use reqwest::Client;
use std::collections::HashMap;
use std::error::Error;
use std::time::Duration;
use tokio::runtime::{Builder, Runtime};

pub struct HttpProviderClient {
    client: Client,
    runtime: Runtime,
    providers: HashMap<String, ProviderConfig>,
}

impl HttpProviderClient {
    pub fn new(providers: &[ProviderConfig], overall_timeout: Duration) -> eyre::Result<Self> {
        let client = Client::builder().timeout(overall_timeout).build()?;
        let runtime = Builder::new_current_thread()
            .enable_all()
            .build()
            .expect("failed to build the provider client's dedicated runtime");
        let providers = providers
            .iter()
            .map(|p| (p.name.clone(), p.clone()))
            .collect();
        Ok(Self {
            client,
            runtime,
            providers,
        })
    }

    fn fetch(&self, provider: &ProviderConfig, address: &str) -> Result<String, Box<dyn Error + Send + Sync>> {
        let url = provider.url_pattern.replacen("%s", address, 1);
        let mut request = self.client.request(provider.method.parse()?, url);
        for (name, value) in &provider.headers {
            request = request.header(name, value);
        }
        self.runtime.block_on(async move {
            let response = request.send().await?;
            if !response.status().is_success() {
                return Err(format!("upstream returned {}", response.status()).into());
            }
            let body: serde_json::Value = response.json().await?;
            walk_scheme(&body, &provider.scheme, &provider.name)
                .map_err(|e| Box::new(e) as Box<dyn Error + Send + Sync>)
        })
    }
}

impl ProviderClient for HttpProviderClient {
    fn fetch_country(
        &self,
        provider_name: &str,
        address: &str,
    ) -> Result<String, Box<dyn Error + Send + Sync>> {
        let provider = self
            .providers
            .get(provider_name)
            .ok_or_else(|| -> Box<dyn Error + Send + Sync> {
                format!("no configured provider named {provider_name:?}").into()
            })?;
        self.fetch(provider, address)
    }
}
