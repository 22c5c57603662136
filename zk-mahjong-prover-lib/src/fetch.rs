//! Remote artifact retrieval.

use crate::error::{Error, Result};
use async_trait::async_trait;
use bytes::Bytes;
use tracing::debug;
use url::Url;

/// Source of artifact bytes addressed by a locator.
#[async_trait]
pub trait Fetcher: Send + Sync {
    /// Fetches the complete blob behind `locator`.
    async fn fetch(&self, locator: &Url) -> Result<Bytes>;
}

/// Fetches `http(s)://` and `file://` locators, and resolves `ipfs://` content
/// identifiers through an HTTP gateway.
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: reqwest::Client,
    gateway: Url,
}

impl HttpFetcher {
    pub fn new(gateway: Url) -> Self {
        Self {
            client: reqwest::Client::new(),
            gateway,
        }
    }

    /// Rewrites `ipfs://<cid>/<path>` onto `<gateway>/ipfs/<cid>/<path>`.
    pub fn resolve(&self, locator: &Url) -> Result<Url> {
        if locator.scheme() != "ipfs" {
            return Ok(locator.clone());
        }
        let cid = locator
            .host_str()
            .ok_or_else(|| Error::InvalidInput(format!("IPFS locator without CID: {}", locator)))?;
        let mut gateway = self.gateway.clone();
        // Url::join drops the last segment unless the base ends with '/'
        if !gateway.path().ends_with('/') {
            let path = format!("{}/", gateway.path());
            gateway.set_path(&path);
        }
        let relative = format!("ipfs/{}{}", cid, locator.path());
        Ok(gateway.join(&relative)?)
    }
}

#[async_trait]
impl Fetcher for HttpFetcher {
    async fn fetch(&self, locator: &Url) -> Result<Bytes> {
        let url = self.resolve(locator)?;
        match url.scheme() {
            "file" => {
                let path = url
                    .to_file_path()
                    .map_err(|_| Error::InvalidInput(format!("Invalid file locator: {}", url)))?;
                debug!(path = %path.display(), "Reading artifact from disk");
                Ok(Bytes::from(tokio::fs::read(&path).await?))
            }
            "http" | "https" => {
                debug!(%url, "Downloading artifact");
                let response = self.client.get(url.clone()).send().await?;
                let status = response.status();
                if !status.is_success() {
                    return Err(Error::FetchError(format!("GET {} returned {}", url, status)));
                }
                let data = response.bytes().await?;
                debug!(%url, len = data.len(), "Artifact downloaded");
                Ok(data)
            }
            other => Err(Error::FetchError(format!(
                "Unsupported locator scheme '{}' in {}",
                other, url
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::prelude::*;

    fn gateway(base: &str) -> HttpFetcher {
        HttpFetcher::new(Url::parse(base).unwrap())
    }

    #[test]
    fn resolves_ipfs_onto_gateway() {
        let fetcher = gateway("https://gateway.example/");
        let locator = Url::parse("ipfs://bafybeigdyr/circuits/encrypt.r1cs").unwrap();
        assert_eq!(
            fetcher.resolve(&locator).unwrap().as_str(),
            "https://gateway.example/ipfs/bafybeigdyr/circuits/encrypt.r1cs"
        );

        // Gateways mounted under a path keep it
        let fetcher = gateway("https://example.org/mirror");
        assert_eq!(
            fetcher.resolve(&locator).unwrap().as_str(),
            "https://example.org/mirror/ipfs/bafybeigdyr/circuits/encrypt.r1cs"
        );

        let plain = Url::parse("https://cdn.example/encrypt.r1cs").unwrap();
        assert_eq!(fetcher.resolve(&plain).unwrap(), plain);
    }

    #[tokio::test]
    async fn downloads_through_gateway() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(GET).path("/ipfs/bafyptau/pot_08.ptau");
                then.status(200)
                    .header("content-type", "application/octet-stream")
                    .body(b"tau bytes");
            })
            .await;

        let fetcher = gateway(&server.base_url());
        let data = fetcher
            .fetch(&Url::parse("ipfs://bafyptau/pot_08.ptau").unwrap())
            .await
            .unwrap();
        assert_eq!(&data[..], b"tau bytes");
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn http_errors_are_fetch_errors() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/missing.r1cs");
                then.status(404);
            })
            .await;

        let fetcher = gateway(&server.base_url());
        let err = fetcher
            .fetch(&Url::parse(&server.url("/missing.r1cs")).unwrap())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::FetchError(_)));
    }

    #[tokio::test]
    async fn reads_file_locators() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("circuit.wasm");
        std::fs::write(&path, b"\0asm").unwrap();

        let fetcher = gateway("https://ipfs.io/");
        let data = fetcher
            .fetch(&Url::from_file_path(&path).unwrap())
            .await
            .unwrap();
        assert_eq!(&data[..], b"\0asm");
    }

    #[tokio::test]
    async fn rejects_unknown_schemes() {
        let fetcher = gateway("https://ipfs.io/");
        let err = fetcher
            .fetch(&Url::parse("ftp://example.org/x").unwrap())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::FetchError(_)));
    }
}
