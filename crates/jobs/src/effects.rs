//! Side-effect surfaces used by the terminal handler: notifications,
//! file downloads and overwrite confirmation.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::Serialize;

use crate::error::EffectError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Success,
    Info,
    Warning,
    Error,
}

/// User-facing notifications (a snackbar in a UI, stderr in the CLI).
pub trait Notifier: Send + Sync {
    fn notify(&self, message: &str, severity: Severity);
}

/// Fetch `url` and store it under `suggested_name`.
#[async_trait]
pub trait FileSaver: Send + Sync {
    async fn download_file(&self, url: &str, suggested_name: &str) -> Result<PathBuf, EffectError>;
}

#[async_trait]
pub trait Confirm: Send + Sync {
    async fn confirm(&self, message: &str) -> bool;
}

/// Answers every confirmation with yes.
#[derive(Debug, Default, Clone, Copy)]
pub struct AlwaysConfirm;

#[async_trait]
impl Confirm for AlwaysConfirm {
    async fn confirm(&self, _message: &str) -> bool {
        true
    }
}

/// Downloads into a directory on disk.
pub struct DiskFileSaver {
    client: reqwest::Client,
    dir: PathBuf,
    token: Option<String>,
    confirm: Box<dyn Confirm>,
}

impl DiskFileSaver {
    pub fn new(client: reqwest::Client, dir: impl Into<PathBuf>, confirm: Box<dyn Confirm>) -> Self {
        Self {
            client,
            dir: dir.into(),
            token: None,
            confirm,
        }
    }

    pub fn with_token(mut self, token: Option<String>) -> Self {
        self.token = token;
        self
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

/// Reduce a server-suggested name to a single safe path component.
pub(crate) fn sanitize_file_name(name: &str) -> String {
    let cleaned: String = name
        .chars()
        .map(|c| match c {
            '/' | '\\' | ':' | '\0' => '_',
            c if c.is_control() => '_',
            c => c,
        })
        .collect();
    let trimmed = cleaned.trim().trim_start_matches('.');
    if trimmed.is_empty() {
        "export.csv".to_string()
    } else {
        trimmed.to_string()
    }
}

#[async_trait]
impl FileSaver for DiskFileSaver {
    async fn download_file(&self, url: &str, suggested_name: &str) -> Result<PathBuf, EffectError> {
        let path = self.dir.join(sanitize_file_name(suggested_name));
        if tokio::fs::try_exists(&path).await.unwrap_or(false) {
            let prompt = format!("{} already exists. Overwrite?", path.display());
            if !self.confirm.confirm(&prompt).await {
                return Err(EffectError::Declined { path });
            }
        }

        let mut request = self.client.get(url);
        if let Some(token) = &self.token {
            request = request.bearer_auth(token);
        }
        let download_err = |source| EffectError::Download {
            url: url.to_string(),
            source,
        };
        let response = request.send().await.map_err(download_err)?;
        let status = response.status();
        if !status.is_success() {
            return Err(EffectError::DownloadStatus {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }
        let bytes = response.bytes().await.map_err(download_err)?;

        let io_err = |source| EffectError::Io {
            path: path.clone(),
            source,
        };
        tokio::fs::create_dir_all(&self.dir).await.map_err(io_err)?;
        tokio::fs::write(&path, &bytes).await.map_err(io_err)?;
        tracing::info!(%url, path = %path.display(), bytes = bytes.len(), "download saved");
        Ok(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sanitize_file_name() {
        assert_eq!(sanitize_file_name("42.csv"), "42.csv");
        assert_eq!(sanitize_file_name("../../etc/passwd"), "_.._etc_passwd");
        assert_eq!(sanitize_file_name("..."), "export.csv");
        assert_eq!(sanitize_file_name(" a:b.json "), "a_b.json");
    }

    struct Never;

    #[async_trait]
    impl Confirm for Never {
        async fn confirm(&self, _message: &str) -> bool {
            false
        }
    }

    #[tokio::test]
    async fn test_declined_overwrite_keeps_file() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("42.csv"), "old").unwrap();

        let saver = DiskFileSaver::new(reqwest::Client::new(), dir.path(), Box::new(Never));
        let err = saver
            .download_file("http://127.0.0.1:9/exports/42.csv", "42.csv")
            .await
            .unwrap_err();
        assert!(matches!(err, EffectError::Declined { .. }));
        assert_eq!(std::fs::read_to_string(dir.path().join("42.csv")).unwrap(), "old");
    }
}
