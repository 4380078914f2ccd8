//! HTTP client speaking the qBittorrent Web API.
//!
//! # Design
//! - One shared `reqwest::Client` with a cookie store holds the `SID` session,
//!   so the adapter is safe to call concurrently from the loop and upload workers.
//! - A `403` means the session lapsed: the client logs in again once and
//!   replays the request.
//! - Read calls never fail outward; errors are logged at `debug` and the
//!   caller sees an empty listing for that tick.

use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::REFERER;
use reqwest::{Client, Method, Response, StatusCode, Url};
use serde::de::DeserializeOwned;
use sluice_torrent_core::{
    DownloadEngine, EngineFile, EnginePreferences, EngineTask, FilePriority,
};
use tracing::{debug, info};

use crate::error::{EngineError, EngineResult};
use crate::wire::{QbFile, QbPreferences, QbTorrent, into_engine_files, join_indices};

const API_ROOT: &str = "api/v2/";

/// Connection settings for [`QbitClient`].
#[derive(Clone)]
pub struct QbitSettings {
    /// Base URL of the Web UI, e.g. `http://localhost:8080`.
    pub base_url: String,
    /// Web UI user name.
    pub username: String,
    /// Web UI password.
    pub password: String,
    /// Per-request timeout.
    pub request_timeout: Duration,
    /// Save path for newly added tasks.
    pub save_path: PathBuf,
}

impl fmt::Debug for QbitSettings {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter
            .debug_struct("QbitSettings")
            .field("base_url", &self.base_url)
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .field("request_timeout", &self.request_timeout)
            .field("save_path", &self.save_path)
            .finish()
    }
}

/// [`DownloadEngine`] implementation backed by a qBittorrent instance.
pub struct QbitClient {
    http: Client,
    base: Url,
    api: Url,
    username: String,
    password: String,
    save_path: String,
}

impl fmt::Debug for QbitClient {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter
            .debug_struct("QbitClient")
            .field("base", &self.base.as_str())
            .field("username", &self.username)
            .finish_non_exhaustive()
    }
}

impl QbitClient {
    /// Build a client for the configured instance. No request is sent until
    /// [`DownloadEngine::login`] is called.
    ///
    /// # Errors
    ///
    /// Returns an error when the base URL is invalid or the HTTP client
    /// cannot be constructed.
    pub fn new(settings: QbitSettings) -> EngineResult<Self> {
        let base = normalise_base(&settings.base_url)?;
        let api = base
            .join(API_ROOT)
            .map_err(|source| EngineError::InvalidEndpoint {
                endpoint: API_ROOT,
                source,
            })?;
        let http = Client::builder()
            .cookie_store(true)
            .timeout(settings.request_timeout)
            .user_agent(concat!("sluice/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|source| EngineError::ClientBuild { source })?;

        Ok(Self {
            http,
            base,
            api,
            username: settings.username,
            password: settings.password,
            save_path: settings.save_path.to_string_lossy().into_owned(),
        })
    }

    fn endpoint(&self, endpoint: &'static str) -> EngineResult<Url> {
        self.api
            .join(endpoint)
            .map_err(|source| EngineError::InvalidEndpoint { endpoint, source })
    }

    async fn authenticate(&self) -> EngineResult<bool> {
        const ENDPOINT: &str = "auth/login";
        let response = self
            .http
            .post(self.endpoint(ENDPOINT)?)
            .header(REFERER, self.base.as_str())
            .form(&[
                ("username", self.username.as_str()),
                ("password", self.password.as_str()),
            ])
            .send()
            .await
            .map_err(|source| EngineError::Transport {
                endpoint: ENDPOINT,
                source,
            })?;
        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|source| EngineError::Transport {
                endpoint: ENDPOINT,
                source,
            })?;
        Ok(login_accepted(status, &body))
    }

    async fn send_once(
        &self,
        method: &Method,
        endpoint: &'static str,
        query: &[(&str, &str)],
        form: Option<&[(&str, String)]>,
    ) -> EngineResult<Response> {
        let mut request = self
            .http
            .request(method.clone(), self.endpoint(endpoint)?)
            .header(REFERER, self.base.as_str());
        if !query.is_empty() {
            request = request.query(query);
        }
        if let Some(form) = form {
            request = request.form(form);
        }
        request
            .send()
            .await
            .map_err(|source| EngineError::Transport { endpoint, source })
    }

    async fn execute(
        &self,
        method: Method,
        endpoint: &'static str,
        query: &[(&str, &str)],
        form: Option<&[(&str, String)]>,
    ) -> EngineResult<String> {
        let mut response = self.send_once(&method, endpoint, query, form).await?;
        if response.status() == StatusCode::FORBIDDEN {
            debug!(endpoint, "engine session rejected; logging in again");
            if self.authenticate().await? {
                response = self.send_once(&method, endpoint, query, form).await?;
            }
        }

        let status = response.status();
        if !status.is_success() {
            return Err(EngineError::Status {
                endpoint,
                status: status.as_u16(),
            });
        }
        response
            .text()
            .await
            .map_err(|source| EngineError::Transport { endpoint, source })
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        endpoint: &'static str,
        query: &[(&str, &str)],
    ) -> EngineResult<T> {
        let body = self.execute(Method::GET, endpoint, query, None).await?;
        serde_json::from_str(&body).map_err(|source| EngineError::Decode { endpoint, source })
    }

    async fn post(&self, endpoint: &'static str, form: &[(&str, String)]) -> EngineResult<()> {
        self.execute(Method::POST, endpoint, &[], Some(form))
            .await
            .map(drop)
    }
}

#[async_trait]
impl DownloadEngine for QbitClient {
    async fn login(&self) -> anyhow::Result<bool> {
        let accepted = self.authenticate().await?;
        if accepted {
            info!(base = %self.base, "authenticated with download engine");
        }
        Ok(accepted)
    }

    async fn list_tasks(&self) -> Vec<EngineTask> {
        match self.get_json::<Vec<QbTorrent>>("torrents/info", &[]).await {
            Ok(tasks) => tasks.into_iter().map(EngineTask::from).collect(),
            Err(error) => {
                debug!(error = %error, "task listing unavailable");
                Vec::new()
            }
        }
    }

    async fn list_files(&self, hash: &str) -> Vec<EngineFile> {
        match self
            .get_json::<Vec<QbFile>>("torrents/files", &[("hash", hash)])
            .await
        {
            Ok(files) => into_engine_files(files),
            Err(error) => {
                debug!(hash, error = %error, "file listing unavailable");
                Vec::new()
            }
        }
    }

    async fn set_priority(
        &self,
        hash: &str,
        indices: &[u32],
        priority: FilePriority,
    ) -> anyhow::Result<()> {
        if indices.is_empty() {
            return Ok(());
        }
        self.post(
            "torrents/filePrio",
            &[
                ("hash", hash.to_string()),
                ("id", join_indices(indices)),
                ("priority", priority.level().to_string()),
            ],
        )
        .await?;
        Ok(())
    }

    async fn resume(&self, hash: &str) -> anyhow::Result<()> {
        let form = [("hashes", hash.to_string())];
        match self.post("torrents/resume", &form).await {
            // v5 servers renamed resume to start.
            Err(error) if error.status() == Some(StatusCode::NOT_FOUND.as_u16()) => {
                self.post("torrents/start", &form).await?;
            }
            other => other?,
        }
        self.reannounce(hash).await
    }

    async fn reannounce(&self, hash: &str) -> anyhow::Result<()> {
        self.post("torrents/reannounce", &[("hashes", hash.to_string())])
            .await?;
        Ok(())
    }

    async fn force_start(&self, hash: &str, enabled: bool) -> anyhow::Result<()> {
        self.post(
            "torrents/setForceStart",
            &[("hashes", hash.to_string()), ("value", enabled.to_string())],
        )
        .await?;
        Ok(())
    }

    async fn delete(&self, hash: &str, delete_files: bool) -> anyhow::Result<()> {
        self.post(
            "torrents/delete",
            &[
                ("hashes", hash.to_string()),
                ("deleteFiles", delete_files.to_string()),
            ],
        )
        .await?;
        Ok(())
    }

    async fn add_task(&self, url: &str) -> anyhow::Result<()> {
        self.post(
            "torrents/add",
            &[
                ("urls", url.to_string()),
                ("paused", "true".to_string()),
                ("stopped", "true".to_string()),
                ("savepath", self.save_path.clone()),
                ("root_folder", "true".to_string()),
            ],
        )
        .await?;
        Ok(())
    }

    async fn apply_preferences(&self, preferences: &EnginePreferences) -> anyhow::Result<()> {
        let json = serde_json::to_string(&QbPreferences::from(preferences))
            .map_err(|source| EngineError::EncodePreferences { source })?;
        self.post("app/setPreferences", &[("json", json)]).await?;
        Ok(())
    }
}

fn normalise_base(raw: &str) -> EngineResult<Url> {
    let mut base = Url::parse(raw).map_err(|source| EngineError::InvalidEndpoint {
        endpoint: "",
        source,
    })?;
    if !base.path().ends_with('/') {
        let path = format!("{}/", base.path());
        base.set_path(&path);
    }
    Ok(base)
}

/// The login endpoint answers `200 Ok.` on success and `200 Fails.` on bad
/// credentials; newer servers may reply with an empty body.
fn login_accepted(status: StatusCode, body: &str) -> bool {
    let body = body.trim();
    status.is_success() && (body == "Ok." || body.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings(base_url: &str) -> QbitSettings {
        QbitSettings {
            base_url: base_url.to_string(),
            username: "admin".into(),
            password: "hunter2".into(),
            request_timeout: Duration::from_secs(5),
            save_path: PathBuf::from("/downloads"),
        }
    }

    #[test]
    fn endpoints_resolve_under_api_root_with_or_without_trailing_slash() {
        for base in ["http://qb.local:8080", "http://qb.local:8080/"] {
            let client = QbitClient::new(settings(base)).expect("client");
            assert_eq!(
                client.endpoint("torrents/info").expect("url").as_str(),
                "http://qb.local:8080/api/v2/torrents/info"
            );
        }

        let nested = QbitClient::new(settings("https://host/qbit")).expect("client");
        assert_eq!(
            nested.endpoint("auth/login").expect("url").as_str(),
            "https://host/qbit/api/v2/auth/login"
        );
    }

    #[test]
    fn invalid_base_url_is_rejected() {
        assert!(matches!(
            QbitClient::new(settings("not a url")),
            Err(EngineError::InvalidEndpoint { .. })
        ));
    }

    #[test]
    fn login_acceptance_requires_success_and_ok_body() {
        assert!(login_accepted(StatusCode::OK, "Ok."));
        assert!(login_accepted(StatusCode::NO_CONTENT, ""));
        assert!(!login_accepted(StatusCode::OK, "Fails."));
        assert!(!login_accepted(StatusCode::FORBIDDEN, "Ok."));
    }

    #[test]
    fn debug_output_redacts_password() {
        let rendered = format!("{:?}", settings("http://qb.local"));
        assert!(!rendered.contains("hunter2"));
        let client = QbitClient::new(settings("http://qb.local")).expect("client");
        assert!(!format!("{client:?}").contains("hunter2"));
    }
}
