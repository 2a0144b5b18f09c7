//! HTTP download and upload streams

use super::Transfer;
use crate::counter::RateCounter;
use crate::error::Result;
use crate::models::Server;
use async_trait::async_trait;
use futures::StreamExt;
use reqwest::header::{ACCEPT_ENCODING, CONTENT_TYPE};
use reqwest::{Body, Client};
use std::io;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use url::Url;

/// Size of one upload body chunk
pub const UPLOAD_CHUNK_SIZE: usize = 64 * 1024;

/// GET of the download path, streamed into the counter
pub struct HttpDownload {
    client: Client,
    url: Url,
}

impl HttpDownload {
    pub fn new(client: Client, server: &Server, chunks: usize) -> Result<Self> {
        let mut url = server.download_endpoint()?;
        url.query_pairs_mut().append_pair("ckSize", &chunks.to_string());
        Ok(Self { client, url })
    }

    pub fn url(&self) -> &Url {
        &self.url
    }
}

#[async_trait]
impl Transfer for HttpDownload {
    async fn run(&self, counter: Arc<RateCounter>, cancel: CancellationToken) -> Result<()> {
        let request = self
            .client
            .get(self.url.clone())
            .header(ACCEPT_ENCODING, "identity")
            .send();

        let response = tokio::select! {
            _ = cancel.cancelled() => return Ok(()),
            response = request => response?.error_for_status()?,
        };

        let mut body = response.bytes_stream();
        loop {
            tokio::select! {
                _ = cancel.cancelled() => return Ok(()),
                chunk = body.next() => match chunk {
                    Some(Ok(bytes)) => {
                        counter.write(&bytes);
                    }
                    Some(Err(e)) => return Err(e.into()),
                    None => return Ok(()),
                },
            }
        }
    }
}

/// POST of `payload_size` bytes pulled through the counter
pub struct HttpUpload {
    client: Client,
    url: Url,
    payload_size: usize,
}

impl HttpUpload {
    pub fn new(client: Client, server: &Server, payload_size: usize) -> Result<Self> {
        Ok(Self {
            client,
            url: server.upload_endpoint()?,
            payload_size,
        })
    }

    pub fn url(&self) -> &Url {
        &self.url
    }
}

#[async_trait]
impl Transfer for HttpUpload {
    async fn run(&self, counter: Arc<RateCounter>, cancel: CancellationToken) -> Result<()> {
        let request = self
            .client
            .post(self.url.clone())
            .header(ACCEPT_ENCODING, "identity")
            .header(CONTENT_TYPE, "application/octet-stream")
            .body(Body::wrap_stream(counted_body(counter, self.payload_size)))
            .send();

        let response = tokio::select! {
            _ = cancel.cancelled() => return Ok(()),
            response = request => response?.error_for_status()?,
        };

        tokio::select! {
            _ = cancel.cancelled() => Ok(()),
            drained = response.bytes() => drained.map(|_| ()).map_err(Into::into),
        }
    }
}

/// Request body of exactly `len` bytes read from the counter's source.
///
/// Ends early if the source reports EOF; a source error ends the body with
/// that error.
pub fn counted_body(
    counter: Arc<RateCounter>,
    len: usize,
) -> impl futures::Stream<Item = io::Result<Vec<u8>>> + Send + 'static {
    futures::stream::unfold((counter, len), |(counter, remaining)| async move {
        if remaining == 0 {
            return None;
        }

        let mut chunk = vec![0u8; remaining.min(UPLOAD_CHUNK_SIZE)];
        match counter.read(&mut chunk) {
            Ok(0) => None,
            Ok(n) => {
                chunk.truncate(n);
                Some((Ok(chunk), (counter, remaining - n)))
            }
            Err(e) => Some((Err(e), (counter, 0))),
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::UnitBase;

    fn server() -> Server {
        Server {
            server: "http://speed.example.com/backend/".to_string(),
            download_url: "garbage.php".to_string(),
            upload_url: "empty.php".to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn test_download_url_carries_chunk_count() {
        let download = HttpDownload::new(Client::new(), &server(), 100).unwrap();
        assert_eq!(download.url().as_str(), "http://speed.example.com/backend/garbage.php?ckSize=100");
    }

    #[test]
    fn test_upload_url() {
        let upload = HttpUpload::new(Client::new(), &server(), 1024).unwrap();
        assert_eq!(upload.url().path(), "/backend/empty.php");
    }

    #[tokio::test]
    async fn test_counted_body_is_exact_and_cycles() {
        let counter = Arc::new(RateCounter::with_cycle_size(UnitBase::Decimal, 100_000));
        counter.generate_payload(100_000).unwrap();
        let payload = counter.payload().unwrap();

        let first: Vec<u8> = counted_body(counter.clone(), 100_000)
            .map(|chunk| chunk.unwrap())
            .concat()
            .await;
        assert_eq!(first.len(), 100_000);
        assert_eq!(&first[..], &payload[..]);
        assert_eq!(counter.position(), 0);

        // the next body starts from the beginning of the payload again
        let second: Vec<u8> = counted_body(counter.clone(), 10)
            .map(|chunk| chunk.unwrap())
            .concat()
            .await;
        assert_eq!(&second[..], &payload[..10]);
        assert_eq!(counter.total_bytes(), 100_010);
    }

    #[tokio::test]
    async fn test_counted_body_without_source_fails() {
        let counter = Arc::new(RateCounter::new(UnitBase::Decimal));
        let chunks: Vec<io::Result<Vec<u8>>> = counted_body(counter, 10).collect().await;
        assert_eq!(chunks.len(), 1);
        assert!(chunks[0].is_err());
    }
}
