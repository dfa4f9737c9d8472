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

//! A `hickory-resolver`-backed implementation of `hostloc_core::Dns`.
//!
//! `hostloc_core::Resolver::resolve` is a synchronous, blocking-work call
//! by design (the core has no opinion about async runtimes); the HTTP
//! handler runs it on a blocking thread via `spawn_blocking`, and this
//! implementation bridges back into async DNS resolution with a small
//! dedicated runtime so it can be driven from that blocking context.

use hickory_resolver::config::{ResolverConfig, ResolverOpts};
use hickory_resolver::TokioAsyncResolver;
use hostloc_core::Dns;
use std::error::Error;
use tokio::runtime::{Builder, Runtime};

pub struct HickoryDns {
    resolver: TokioAsyncResolver,
    runtime: Runtime,
}

impl HickoryDns {
    pub fn from_system_config() -> eyre::Result<Self> {
        let (config, opts) = hickory_resolver::system_conf::read_system_conf()
            .map(|(c, o)| (c, o))
            .unwrap_or_else(|_| (ResolverConfig::default(), ResolverOpts::default()));
        let runtime = Builder::new_current_thread()
            .enable_all()
            .build()
            .expect("failed to build the DNS resolver's dedicated runtime");
        let resolver = runtime.block_on(async { TokioAsyncResolver::tokio(config, opts) });
        Ok(Self { resolver, runtime })
    }
}

impl Dns for HickoryDns {
    fn resolve(&self, host: &str) -> Result<String, Box<dyn Error + Send + Sync>> {
        let lookup = self
            .runtime
            .block_on(self.resolver.lookup_ip(host))
            .map_err(|e| Box::new(e) as Box<dyn Error + Send + Sync>)?;
        lookup
            .iter()
            .next()
            .map(|addr| addr.to_string())
            .ok_or_else(|| "dns lookup returned no addresses".into())
    }
}
