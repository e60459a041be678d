use anyhow::{bail, Context, Result};
use chrono::{DateTime, Utc};
use log::debug;
#[cfg(test)]
use mockall::automock;
use reqwest::Client;
use serde::Serialize;

use crate::time_entry::NormalizedEntry;

/// Jiraへ登録するworklog。
#[derive(Clone, Debug, PartialEq)]
pub struct NewWorklog {
    pub issue_key: String,
    pub started: DateTime<Utc>,
    pub time_spent_seconds: i64,
    pub comment: Option<String>,
}

impl From<&NormalizedEntry> for NewWorklog {
    fn from(entry: &NormalizedEntry) -> Self {
        Self {
            issue_key: entry.issue_key.clone(),
            started: entry.start_time,
            time_spent_seconds: entry.duration_seconds,
            comment: entry.comment().map(str::to_string),
        }
    }
}

/// Jira APIへ送信するworklogのリクエストボディ。
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct WorklogBody<'a> {
    started: String,
    time_spent_seconds: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    comment: Option<&'a str>,
}

/// worklogを登録するためのリポジトリ。
#[cfg_attr(test, automock)]
#[allow(async_fn_in_trait)]
pub trait JiraRepository {
    /// worklogを1件登録する。
    ///
    /// 2xx以外のレスポンスはエラーにする。
    async fn create_worklog(&self, worklog: &NewWorklog) -> Result<()>;
}

/// Jiraへの接続情報。
#[derive(Clone, Debug, PartialEq)]
pub struct JiraCredentials {
    pub server: String,
    pub username: String,
    pub password: Option<String>,
}

impl JiraCredentials {
    /// 接続先のベースURLを返す。
    ///
    /// サイト名だけが指定された場合はAtlassian CloudのURLとみなす。
    pub fn base_url(&self) -> String {
        let server = self.server.trim().trim_end_matches('/');
        if server.contains("://") {
            server.to_string()
        } else {
            format!("https://{}.atlassian.net", server)
        }
    }
}

/// Jira REST API v2と通信するためのクライアント。
pub struct JiraClient {
    client: Client,
    base_url: String,
    username: String,
    password: String,
}

impl JiraClient {
    /// 新しい`JiraClient`を返す。
    ///
    /// パスワードが設定されていない場合はエラーを返す。
    pub fn connect(credentials: JiraCredentials) -> Result<Self> {
        let base_url = credentials.base_url();
        let password = credentials
            .password
            .context("Jira password must be set")?;

        Ok(Self {
            client: Client::new(),
            base_url,
            username: credentials.username,
            password,
        })
    }
}

/// 日時をJiraが受け付けるミリ秒とオフセット付きの形式にする。
fn to_jira_format(datetime: &DateTime<Utc>) -> String {
    format!("{}.000+0000", datetime.format("%Y-%m-%dT%H:%M:%S"))
}

impl JiraRepository for JiraClient {
    async fn create_worklog(&self, worklog: &NewWorklog) -> Result<()> {
        let url = format!(
            "{}/rest/api/2/issue/{}/worklog",
            self.base_url, worklog.issue_key
        );
        let body = WorklogBody {
            started: to_jira_format(&worklog.started),
            time_spent_seconds: worklog.time_spent_seconds,
            comment: worklog.comment.as_deref(),
        };
        debug!("POST {} {:?}", url, body);

        let response = self
            .client
            .post(&url)
            .basic_auth(&self.username, Some(&self.password))
            .query(&[("notifyUsers", "false")])
            .json(&body)
            .send()
            .await
            .with_context(|| format!("Failed to send request to Jira API at {}", url))?;

        let status = response.status();
        if !status.is_success() {
            let reason = response.text().await.unwrap_or_default();
            bail!("Jira API returned {}: {}", status, reason.trim());
        }

        Ok(())
    }
}
