//! File download from the project file server.
//!
//! Files live at `{file_url}/{project}/api/{file_path}` where every `./`
//! is removed from the stored path. Certificate verification is disabled.
//! The timeout bounds connecting and each read, not the whole transfer.

use std::path::{Path, PathBuf};
use std::time::Duration;

use thiserror::Error;
use tokio::io::AsyncWriteExt;

use crate::extract::sanitize_entry_name;

#[derive(Debug, Error)]
pub enum DownloadError {
    #[error("Invalid file URL {url}: {source}")]
    InvalidUrl {
        url: String,
        #[source]
        source: url::ParseError,
    },

    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("HTTP {status} for {url}")]
    Status { status: u16, url: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Build the download URL for a stored file path.
pub fn build_file_url(file_url: &str, project: &str, file_path: &str) -> String {
    format!(
        "{}/{}/api/{}",
        file_url.trim_end_matches('/'),
        project,
        file_path.replace("./", "")
    )
}

/// Name the downloaded file after the last component of the stored path.
pub fn local_file_name(file_path: &str) -> String {
    sanitize_entry_name(&file_path.replace("./", ""))
}

/// HTTP client bound to one file server.
#[derive(Clone)]
pub struct Downloader {
    client: reqwest::Client,
    file_url: String,
}

impl Downloader {
    pub fn new(file_url: &str, timeout: Duration) -> Result<Self, DownloadError> {
        let client = reqwest::Client::builder()
            .danger_accept_invalid_certs(true)
            .connect_timeout(timeout)
            .read_timeout(timeout)
            .gzip(true)
            .build()?;
        Ok(Self {
            client,
            file_url: file_url.to_string(),
        })
    }

    pub fn file_url(&self) -> &str {
        &self.file_url
    }

    /// Stream one file into `dest_dir`, returning the local path.
    ///
    /// Non-2xx responses are errors. A partially written file is left for
    /// the caller's scratch directory cleanup.
    pub async fn download(
        &self,
        project: &str,
        file_path: &str,
        dest_dir: &Path,
    ) -> Result<PathBuf, DownloadError> {
        let raw_url = build_file_url(&self.file_url, project, file_path);
        let url = url::Url::parse(&raw_url).map_err(|source| DownloadError::InvalidUrl {
            url: raw_url.clone(),
            source,
        })?;

        tracing::debug!("Downloading {}", url);
        let mut response = self.client.get(url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(DownloadError::Status {
                status: status.as_u16(),
                url: raw_url,
            });
        }

        let dest = dest_dir.join(local_file_name(file_path));
        let mut file = tokio::fs::File::create(&dest).await?;
        let mut written = 0u64;
        while let Some(chunk) = response.chunk().await? {
            file.write_all(&chunk).await?;
            written += chunk.len() as u64;
        }
        file.flush().await?;

        tracing::info!("Downloaded {} ({} bytes) to {}", raw_url, written, dest.display());
        Ok(dest)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_file_url() {
        assert_eq!(
            build_file_url("https://files.example.org", "cityA", "./uploads/2023/report.pdf"),
            "https://files.example.org/cityA/api/uploads/2023/report.pdf"
        );
        assert_eq!(
            build_file_url("https://files.example.org/", "cityA", "uploads/./a/./b.txt"),
            "https://files.example.org/cityA/api/uploads/a/b.txt"
        );
    }

    #[test]
    fn test_local_file_name() {
        assert_eq!(local_file_name("./uploads/2023/報告.pdf"), "報告.pdf");
        assert_eq!(local_file_name("uploads\\legacy\\scan.tif"), "scan.tif");
        assert_eq!(local_file_name("uploads/"), "extracted_file");
    }

    /// Serve one response whose body trickles out a byte at a time.
    async fn trickle_server(body: &'static [u8], delay: Duration) -> String {
        use tokio::io::AsyncReadExt;

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut request = [0u8; 1024];
            let _ = socket.read(&mut request).await;
            let head = format!(
                "HTTP/1.1 200 OK\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
                body.len()
            );
            socket.write_all(head.as_bytes()).await.unwrap();
            for byte in body {
                tokio::time::sleep(delay).await;
                socket.write_all(&[*byte]).await.unwrap();
                socket.flush().await.unwrap();
            }
        });
        format!("http://{}", addr)
    }

    #[tokio::test]
    async fn test_slow_body_outlasting_timeout_completes() {
        let dir = tempfile::tempdir().unwrap();
        let base_url = trickle_server(b"slow body", Duration::from_millis(250)).await;
        let downloader = Downloader::new(&base_url, Duration::from_secs(1)).unwrap();

        let path = downloader
            .download("cityA", "uploads/slow.txt", dir.path())
            .await
            .unwrap();
        assert_eq!(std::fs::read(path).unwrap(), b"slow body");
    }

    #[tokio::test]
    async fn test_stalled_body_times_out() {
        let dir = tempfile::tempdir().unwrap();
        let base_url = trickle_server(b"xy", Duration::from_secs(3)).await;
        let downloader = Downloader::new(&base_url, Duration::from_millis(300)).unwrap();

        let result = downloader.download("cityA", "uploads/stall.txt", dir.path()).await;
        assert!(matches!(result, Err(DownloadError::Http(_))));
    }

    #[tokio::test]
    async fn test_invalid_base_url() {
        let dir = tempfile::tempdir().unwrap();
        let downloader = Downloader::new("not a url", Duration::from_secs(1)).unwrap();
        let result = downloader.download("cityA", "a.txt", dir.path()).await;
        assert!(matches!(result, Err(DownloadError::InvalidUrl { .. })));
    }
}
