// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! HTTP client construction.

use std::error::Error;
use std::time::Duration;
use tracing::error;

use crate::config::Config;

/// Builds the client used for batch requests.
///
/// An invalid proxy is logged and the client falls back to a direct
/// connection so events keep flowing.
#[must_use]
pub fn get_client(config: &Config) -> reqwest::Client {
    match build_client(config) {
        Ok(client) => client,
        Err(e) => {
            error!(
                "TRANSMISSION | Unable to parse proxy configuration: {}, falling back to direct connection",
                e
            );
            match base_builder(config).build() {
                Ok(client) => client,
                Err(inner) => {
                    error!(
                        "TRANSMISSION | Failed to build HTTP client without proxy: {}, using reqwest defaults",
                        inner
                    );
                    reqwest::Client::new()
                }
            }
        }
    }
}

fn build_client(config: &Config) -> Result<reqwest::Client, Box<dyn Error>> {
    let mut builder = base_builder(config);
    if let Some(proxy) = &config.https_proxy {
        builder = builder.proxy(reqwest::Proxy::https(proxy.as_str())?);
    }
    Ok(builder.build()?)
}

fn base_builder(config: &Config) -> reqwest::ClientBuilder {
    reqwest::Client::builder()
        .use_rustls_tls()
        .timeout(config.timeout)
        .pool_idle_timeout(Duration::from_secs(90))
        .tcp_keepalive(Duration::from_secs(60))
}
