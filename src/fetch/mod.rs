// src/fetch/mod.rs

use anyhow::{Context, Result};
use bytes::Bytes;
use reqwest::Client;
use tokio::time::Instant;
use tracing::{debug, info, instrument};
use url::Url;

/// Download `url_str` fully into memory. Any non-2xx status is an error; there is no retry.
#[instrument(level = "debug", skip(client))]
pub async fn download(client: &Client, url_str: &str) -> Result<Bytes> {
    let url = Url::parse(url_str).with_context(|| format!("parsing URL {}", url_str))?;
    let name = file_name(&url);
    let start = Instant::now();

    debug!(%url, "GET");
    let bytes = client
        .get(url.as_str())
        .send()
        .await
        .with_context(|| format!("GET {}", url))?
        .error_for_status()
        .with_context(|| format!("non-success status from {}", url))?
        .bytes()
        .await
        .with_context(|| format!("reading body from {}", url))?;

    info!(name = %name, bytes = bytes.len(), elapsed = ?start.elapsed(), "downloaded");
    Ok(bytes)
}

/// Last non-empty path segment of `url`, or its host when the path is bare.
pub fn file_name(url: &Url) -> String {
    url.path_segments()
        .and_then(|segments| segments.filter(|s| !s.is_empty()).last())
        .map(str::to_string)
        .or_else(|| url.host_str().map(str::to_string))
        .unwrap_or_else(|| "download".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[test]
    fn file_name_takes_last_segment() {
        let url = Url::parse(
            "https://d37ci6vzurychx.cloudfront.net/trip-data/green_tripdata_2025-11.parquet",
        )
        .unwrap();
        assert_eq!(file_name(&url), "green_tripdata_2025-11.parquet");

        let url = Url::parse("https://example.com/misc/").unwrap();
        assert_eq!(file_name(&url), "misc");

        let url = Url::parse("https://example.com").unwrap();
        assert_eq!(file_name(&url), "example.com");
    }

    #[tokio::test]
    async fn download_returns_body() -> Result<()> {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/misc/taxi_zone_lookup.csv"))
            .respond_with(ResponseTemplate::new(200).set_body_string("a,b\n1,2\n"))
            .expect(1)
            .mount(&server)
            .await;

        let url = format!("{}/misc/taxi_zone_lookup.csv", server.uri());
        let body = download(&Client::new(), &url).await?;
        assert_eq!(&body[..], b"a,b\n1,2\n");
        Ok(())
    }

    #[tokio::test]
    async fn download_fails_on_error_status_without_retrying() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(503))
            .expect(1)
            .mount(&server)
            .await;

        let url = format!("{}/trip-data/missing.parquet", server.uri());
        let err = download(&Client::new(), &url).await.unwrap_err();
        assert!(format!("{:#}", err).contains("non-success status"));
    }

    #[tokio::test]
    async fn download_rejects_malformed_url() {
        let err = download(&Client::new(), "not a url").await.unwrap_err();
        assert!(err.to_string().contains("parsing URL"));
    }
}
