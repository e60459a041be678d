use anyhow::{bail, Context, Result};
use chrono::{DateTime, Utc};
use log::info;
#[cfg(test)]
use mockall::automock;
use reqwest::{header::CONTENT_TYPE, Client};
use serde::Deserialize;

use crate::time_entry::RawTimeEntry;

const TOGGL_API_URL: &str = "https://api.track.toggl.com/api/v9";

/// Toggl APIのレスポンスをデシリアライズするための構造体。
#[derive(Debug, Deserialize)]
struct TogglTimeEntry {
    description: Option<String>,
    start: String,
    duration: i64,
}

/// time entryを取得するためのリポジトリ。
#[cfg_attr(test, automock)]
#[allow(async_fn_in_trait)]
pub trait TogglRepository {
    /// 指定された期間のタイムエントリーを取得する。
    ///
    /// 成功以外のレスポンスはステータスと理由を含むエラーにする。
    ///
    /// # Arguments
    ///
    /// * `start_at` - 取得するタイムエントリーの開始日時
    /// * `end_at` - 取得するタイムエントリーの終了日時
    async fn read_time_entries(
        &self,
        start_at: &DateTime<Utc>,
        end_at: &DateTime<Utc>,
    ) -> Result<Vec<RawTimeEntry>>;
}

/// Toggl APIと通信するためのクライアント。
///
/// # Examples
///
/// ```
/// let client = TogglClient::new("token");
/// let time_entries = client.read_time_entries(&start_at, &end_at).await.unwrap();
/// ```
pub struct TogglClient {
    client: Client,
    api_url: String,
    api_token: String,
}

impl TogglClient {
    /// 新しい`TogglClient`を返す。
    ///
    /// # Arguments
    ///
    /// * `api_token` - Toggl APIのトークン
    pub fn new(api_token: &str) -> Self {
        Self {
            client: Client::new(),
            api_url: TOGGL_API_URL.to_string(),
            api_token: api_token.to_string(),
        }
    }

    /// 接続先のURLを変更する。
    pub fn with_api_url(mut self, api_url: &str) -> Self {
        self.api_url = api_url.trim_end_matches('/').to_string();
        self
    }
}

/// 日時をTogglが受け付ける`+00:00`のオフセット付き形式にする。
fn to_wire_format(datetime: &DateTime<Utc>) -> String {
    datetime.format("%Y-%m-%dT%H:%M:%S+00:00").to_string()
}

impl TogglRepository for TogglClient {
    async fn read_time_entries(
        &self,
        start_at: &DateTime<Utc>,
        end_at: &DateTime<Utc>,
    ) -> Result<Vec<RawTimeEntry>> {
        let response = self
            .client
            .get(format!("{}/me/time_entries", self.api_url))
            .basic_auth(&self.api_token, Some("api_token"))
            .header(CONTENT_TYPE, "application/json")
            .query(&[
                ("start_date", to_wire_format(start_at)),
                ("end_date", to_wire_format(end_at)),
            ])
            .send()
            .await
            .with_context(|| format!("Failed to send request to Toggl API at {}", self.api_url))?;

        let status = response.status();
        if !status.is_success() {
            let reason = response.text().await.unwrap_or_default();
            let reason = if reason.trim().is_empty() {
                status.canonical_reason().unwrap_or_default().to_string()
            } else {
                reason.trim().to_string()
            };
            bail!("Toggl API returned {}: {}", status, reason);
        }

        let toggl_time_entries = response
            .json::<Vec<TogglTimeEntry>>()
            .await
            .context("Failed to deserialize response")?;
        info!("length of time entries: {}", toggl_time_entries.len());

        let time_entries = toggl_time_entries
            .into_iter()
            .map(|entry| RawTimeEntry {
                description: entry.description.unwrap_or_default(),
                start: entry.start,
                duration: entry.duration,
            })
            .collect();

        Ok(time_entries)
    }
}
