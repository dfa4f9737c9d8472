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

mod config;
mod dns;
mod http;
mod provider;

use clap::Parser;
use config::Config;
use dns::HickoryDns;
use eyre::Context;
use hostloc_core::{BlockPool, ProviderIterator, ProviderSpec, Resolver, TTLCache};
use provider::HttpProviderClient;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};
use tracing_subscriber::fmt::format::FmtSpan;

#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

/// Host-to-country resolver: caches lookups, rate-limits upstream
/// geolocation providers, and rotates between them fairly.
#[derive(Parser, Debug)]
#[command(name = "hostlocd")]
struct Args {
    /// Path to the JSON configuration file.
    #[arg(short = 'c', long = "config", default_value = "conf.json")]
    config: PathBuf,
}

fn main() -> eyre::Result<()> {
    color_eyre::install()?;
    let args = Args::parse();

    let config = Config::load(&args.config)?;
    init_tracing(&config.log);

    tracing::info!(path = %args.config.display(), "loaded configuration");

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .wrap_err("building the tokio runtime")?;

    runtime.block_on(run(config))
}

async fn run(config: Config) -> eyre::Result<()> {
    let cache = Arc::new(TTLCache::new(config.cache.ttl, config.cache.npartitions));
    spawn_sweeper(Arc::clone(&cache));

    let specs: Vec<ProviderSpec> = config
        .providers
        .iter()
        .map(|p| ProviderSpec {
            name: p.name.clone(),
            max_per_minute: p.max_rate,
        })
        .collect();
    let pool = Arc::new(BlockPool::new());
    let iterator = Arc::new(ProviderIterator::new(specs, pool, now_s()));

    let dns = HickoryDns::from_system_config()?;
    let provider_client = HttpProviderClient::new(&config.providers, config.http.overall_timeout)?;
    let resolver = Arc::new(Resolver::new(dns, provider_client, cache, iterator));

    let state = http::AppState { resolver };
    let app = http::routes(state);

    let addr = std::net::SocketAddr::from(([0, 0, 0, 0], config.http.listen_port));
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .wrap_err_with(|| format!("binding {addr}"))?;
    tracing::info!(%addr, "listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .wrap_err("serving http")?;

    Ok(())
}

async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
    tracing::info!("shutdown signal received");
}

/// A 60-second tick that runs `TTLCache::sweep_once` forever, sleeping for
/// whatever the sweeper reports as the next useful wake time.
fn spawn_sweeper(cache: Arc<TTLCache>) {
    tokio::spawn(async move {
        let min_wake = std::time::Duration::from_millis(1);
        loop {
            let wait = cache.sweep_once(min_wake);
            tokio::time::sleep(wait).await;
        }
    });
}

fn now_s() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("system clock is before the unix epoch")
        .as_secs() as i64
}

fn init_tracing(log: &config::LogConfig) {
    let filter = tracing_subscriber::EnvFilter::new(&log.filter);
    if log.json {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_span_events(FmtSpan::CLOSE)
            .json()
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_span_events(FmtSpan::CLOSE)
            .init();
    }
}
