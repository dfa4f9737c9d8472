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

use eyre::{Context, Result};
use figment::providers::{Format, Json};
use figment::Figment;
use serde::Deserialize;
use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

#[derive(Debug, Deserialize)]
pub struct Config {
    pub cache: CacheConfig,
    pub providers: Vec<ProviderConfig>,
    pub http: HttpConfig,
    #[serde(default)]
    pub log: LogConfig,
}

#[derive(Debug, Deserialize)]
pub struct CacheConfig {
    #[serde(deserialize_with = "deserialize_duration")]
    pub ttl: Duration,
    pub npartitions: usize,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ProviderConfig {
    pub name: String,
    pub method: String,
    /// A format string with one `%s` slot for the resolved address.
    pub url_pattern: String,
    pub scheme: Vec<String>,
    #[serde(default)]
    pub headers: HashMap<String, String>,
    pub max_rate: i64,
}

#[derive(Debug, Deserialize)]
pub struct HttpConfig {
    pub listen_port: u16,
    #[serde(deserialize_with = "deserialize_duration")]
    pub overall_timeout: Duration,
    #[serde(deserialize_with = "deserialize_duration")]
    pub dial_timeout: Duration,
    #[serde(deserialize_with = "deserialize_duration")]
    pub keep_alive: Duration,
    #[serde(deserialize_with = "deserialize_duration")]
    pub tls_handshake_timeout: Duration,
}

#[derive(Debug, Deserialize)]
pub struct LogConfig {
    #[serde(default)]
    pub json: bool,
    #[serde(default = "default_log_filter")]
    pub filter: String,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            json: false,
            filter: default_log_filter(),
        }
    }
}

fn default_log_filter() -> String {
    "info".to_string()
}

fn deserialize_duration<'de, D>(deserializer: D) -> Result<Duration, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let raw = String::deserialize(deserializer)?;
    humantime::parse_duration(&raw).map_err(serde::de::Error::custom)
}

impl Config {
    pub fn load(path: &Path) -> Result<Self> {
        Figment::new()
            .merge(Json::file(path))
            .extract()
            .wrap_err_with(|| format!("loading configuration from {}", path.display()))
    }
}
