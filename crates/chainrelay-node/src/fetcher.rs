use chainrelay_core::{ChainFetcher, ChainSnapshot, FetchError};
use reqwest::Client;
use std::time::Duration;
use tracing::debug;

/// Pulls `GET http://{peer}/get_chain` from other nodes.
#[derive(Clone, Debug)]
pub struct HttpChainFetcher {
    http: Client,
}

impl HttpChainFetcher {
    pub fn new(timeout: Duration) -> reqwest::Result<Self> {
        let http = Client::builder().timeout(timeout).build()?;
        Ok(Self { http })
    }
}

impl ChainFetcher for HttpChainFetcher {
    async fn fetch_chain(&self, peer: &str) -> Result<ChainSnapshot, FetchError> {
        let url = format!("http://{peer}/get_chain");
        debug!(%url, "fetching peer chain");
        let res = self
            .http
            .get(&url)
            .send()
            .await
            .map_err(|err| FetchError::Unreachable(err.to_string()))?;
        let status = res.status();
        if !status.is_success() {
            return Err(FetchError::Status(status.as_u16()));
        }
        res.json::<ChainSnapshot>()
            .await
            .map_err(|err| FetchError::Malformed(err.to_string()))
    }
}
