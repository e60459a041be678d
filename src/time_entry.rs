use anyhow::{Context, Result};
use chrono::{DateTime, Utc};

use crate::issue::{extract_issue_key, strip_issue_key};

/// Jiraが受け付けるworklogの最小秒数。
pub const MIN_WORKLOG_SECONDS: i64 = 60;

/// Togglから取得したままのtime entry。
#[derive(Clone, Debug, PartialEq)]
pub struct RawTimeEntry {
    pub description: String,
    /// `YYYY-MM-DDTHH:MM:SS+00:00`形式の開始日時
    pub start: String,
    /// 実行中のエントリーは負の値になる
    pub duration: i64,
}

/// Jiraに送信できる状態に正規化したtime entry。
#[derive(Clone, Debug, PartialEq)]
pub struct NormalizedEntry {
    pub issue_key: String,
    pub start_time: DateTime<Utc>,
    pub duration_seconds: i64,
    pub description: String,
}

impl NormalizedEntry {
    /// descriptionから課題キーを除いたworklogのコメントを返す。
    pub fn comment(&self) -> Option<&str> {
        strip_issue_key(&self.description, &self.issue_key)
    }
}

/// 課題キーを持ち、かつ60秒以上のtime entryだけを残して正規化する。
///
/// 入力の順序は保持する。
///
/// # Arguments
///
/// * `entries` - Togglから取得したtime entry
pub fn filter_entries(entries: &[RawTimeEntry]) -> Result<Vec<NormalizedEntry>> {
    entries
        .iter()
        .filter_map(|entry| {
            let issue_key = extract_issue_key(&entry.description)?;
            if entry.duration < MIN_WORKLOG_SECONDS {
                return None;
            }
            Some(normalize(entry, issue_key))
        })
        .collect()
}

fn normalize(entry: &RawTimeEntry, issue_key: &str) -> Result<NormalizedEntry> {
    let start_time = DateTime::parse_from_rfc3339(&entry.start)
        .with_context(|| format!("Failed to parse start time: {}", entry.start))?
        .to_utc();

    Ok(NormalizedEntry {
        issue_key: issue_key.to_string(),
        start_time,
        duration_seconds: entry.duration,
        description: entry.description.clone(),
    })
}
