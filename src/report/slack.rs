//! Slack Web API notifier
//!
//! Posts the run summary to a channel and threads export files under it
//! through the external upload flow:
//! 1. `files.getUploadURLExternal` reserves an upload URL
//! 2. the file bytes are posted to that URL
//! 3. `files.completeUploadExternal` shares the file in the channel

use crate::config::SlackSettings;
use crate::detect::DetectionResult;
use crate::error::{SinkError, SinkResult};
use crate::labels::Labels;
use crate::report::Notifier;
use crate::report::message::{format_detection_summary, format_error_message};
use async_trait::async_trait;
use chrono::{DateTime, FixedOffset, Utc};
use reqwest::multipart::{Form, Part};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

/// Files above this size are not uploaded
pub const MAX_UPLOAD_BYTES: u64 = 50 * 1024 * 1024;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Envelope shared by every Web API response
#[derive(Debug, Deserialize)]
struct SlackResponse {
    ok: bool,
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    ts: Option<String>,
    #[serde(default)]
    upload_url: Option<String>,
    #[serde(default)]
    file_id: Option<String>,
    #[serde(default)]
    user: Option<String>,
    #[serde(default)]
    team: Option<String>,
}

impl SlackResponse {
    fn into_result(self) -> SinkResult<Self> {
        if self.ok {
            Ok(self)
        } else {
            Err(SinkError::Slack(
                self.error.unwrap_or_else(|| "unknown_error".to_string()),
            ))
        }
    }
}

pub struct SlackNotifier {
    client: reqwest::Client,
    api_base_url: String,
    token: String,
    channel: String,
    labels: Arc<Labels>,
    cutoff_date: String,
    utc_offset: FixedOffset,
}

impl SlackNotifier {
    /// Build a notifier, or `None` when Slack is disabled or has no token.
    pub fn from_settings(
        settings: &SlackSettings,
        labels: Arc<Labels>,
        cutoff_date: &str,
        utc_offset: FixedOffset,
    ) -> SinkResult<Option<Self>> {
        let token = match (&settings.bot_token, settings.enabled) {
            (Some(token), true) if !token.is_empty() => token.clone(),
            _ => return Ok(None),
        };
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()?;

        Ok(Some(Self {
            client,
            api_base_url: settings.api_base_url.trim_end_matches('/').to_string(),
            token,
            channel: settings.channel.clone(),
            labels,
            cutoff_date: cutoff_date.to_string(),
            utc_offset,
        }))
    }

    fn now(&self) -> DateTime<FixedOffset> {
        Utc::now().with_timezone(&self.utc_offset)
    }

    fn url(&self, method: &str) -> String {
        format!("{}/{}", self.api_base_url, method)
    }

    async fn parse(response: reqwest::Response) -> SinkResult<SlackResponse> {
        let status = response.status();
        if !status.is_success() {
            let text = response.text().await?;
            return Err(SinkError::Slack(format!("HTTP {}: {}", status.as_u16(), text)));
        }
        response.json::<SlackResponse>().await?.into_result()
    }

    /// Post a plain message; returns its timestamp for threading
    pub async fn post_message(&self, text: &str) -> SinkResult<Option<String>> {
        let body = serde_json::json!({
            "channel": self.channel,
            "text": text,
            "unfurl_links": false,
            "unfurl_media": false,
        });
        let response = self
            .client
            .post(self.url("chat.postMessage"))
            .bearer_auth(&self.token)
            .json(&body)
            .send()
            .await?;
        Ok(Self::parse(response).await?.ts)
    }

    /// Upload a file into the channel, threaded under `thread_ts` if given.
    /// Files above [`MAX_UPLOAD_BYTES`] are skipped with a warning.
    pub async fn upload_file(&self, path: &Path, thread_ts: Option<&str>) -> SinkResult<()> {
        let size = tokio::fs::metadata(path).await?.len();
        if size > MAX_UPLOAD_BYTES {
            tracing::warn!(
                path = %path.display(),
                size_mb = size / 1024 / 1024,
                "파일 크기가 너무 큽니다. Slack 업로드를 건너뜁니다."
            );
            return Ok(());
        }

        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "export".to_string());

        let reserved = Self::parse(
            self.client
                .post(self.url("files.getUploadURLExternal"))
                .bearer_auth(&self.token)
                .form(&[("filename", file_name.clone()), ("length", size.to_string())])
                .send()
                .await?,
        )
        .await?;
        let (Some(upload_url), Some(file_id)) = (reserved.upload_url, reserved.file_id) else {
            return Err(SinkError::Slack("upload URL missing from response".to_string()));
        };

        let bytes = tokio::fs::read(path).await?;
        let form = Form::new().part("file", Part::bytes(bytes).file_name(file_name.clone()));
        let uploaded = self.client.post(&upload_url).multipart(form).send().await?;
        if !uploaded.status().is_success() {
            return Err(SinkError::Slack(format!(
                "file upload returned HTTP {}",
                uploaded.status().as_u16()
            )));
        }

        let mut complete = serde_json::json!({
            "files": [{ "id": file_id, "title": format!("스케줄 감지 결과 - {}", file_name) }],
            "channel_id": self.channel,
            "initial_comment": "📋 상세한 감지 결과가 포함된 파일입니다.",
        });
        if let Some(ts) = thread_ts {
            complete["thread_ts"] = serde_json::Value::String(ts.to_string());
        }
        Self::parse(
            self.client
                .post(self.url("files.completeUploadExternal"))
                .bearer_auth(&self.token)
                .json(&complete)
                .send()
                .await?,
        )
        .await?;

        tracing::info!(file = %file_name, "파일이 Slack에 업로드되었습니다");
        Ok(())
    }
}

#[async_trait]
impl Notifier for SlackNotifier {
    async fn notify(&self, results: &[DetectionResult], attachments: &[PathBuf]) -> SinkResult<()> {
        let text = format_detection_summary(results, &self.labels, &self.cutoff_date, self.now());
        let ts = self.post_message(&text).await?;
        tracing::info!("Slack 메시지가 전송되었습니다");

        for path in attachments {
            // One failed upload does not hold back the others
            if let Err(e) = self.upload_file(path, ts.as_deref()).await {
                tracing::error!(path = %path.display(), error = %e, "Slack 파일 업로드 실패");
            }
        }
        Ok(())
    }

    async fn notify_error(&self, message: &str) -> SinkResult<()> {
        let text = format_error_message(message, self.now());
        self.post_message(&text).await?;
        Ok(())
    }

    /// `auth.test` with the bot token
    async fn check(&self) -> SinkResult<()> {
        let response = self
            .client
            .post(self.url("auth.test"))
            .bearer_auth(&self.token)
            .send()
            .await?;
        let auth = Self::parse(response).await?;
        tracing::info!(
            user = auth.user.as_deref().unwrap_or("?"),
            team = auth.team.as_deref().unwrap_or("?"),
            "Slack 연결 테스트 성공"
        );
        Ok(())
    }
}
