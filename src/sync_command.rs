use anyhow::{bail, Context, Result};
use chrono::{DateTime, Duration, NaiveDate, Utc};
use log::{debug, info, warn};

use crate::config::CursorStore;
use crate::console::{render_report, Operator};
use crate::datetime;
use crate::issue::extract_issue_key;
use crate::jira::{JiraCredentials, JiraRepository, NewWorklog};
use crate::time_entry::{filter_entries, RawTimeEntry, MIN_WORKLOG_SECONDS};
use crate::toggl::TogglRepository;

/// 同期する期間。指定がなければカーソルや今日の日付から決める。
#[derive(Clone, Debug, Default, PartialEq)]
pub struct SyncWindow {
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
}

/// 同期の結果。
#[derive(Clone, Debug, PartialEq)]
pub enum SyncOutcome {
    /// 送信対象のエントリーがなかった
    NothingToSync,
    /// 操作者が送信を取り消した
    Aborted,
    /// すべてのエントリーを送信し、カーソルを進めた
    Synced { posted: usize, cursor: NaiveDate },
}

/// TogglのエントリーをJiraのworklogに同期するコマンド。
pub struct SyncCommand<'a, T: TogglRepository, C: CursorStore, O: Operator> {
    toggl_client: &'a T,
    cursor_store: &'a C,
    operator: &'a O,
}

impl<'a, T: TogglRepository, C: CursorStore, O: Operator> SyncCommand<'a, T, C, O> {
    /// 新しい`SyncCommand`を返す。
    ///
    /// # Arguments
    ///
    /// * `toggl_client` - Toggl APIと通信するためのリポジトリ
    /// * `cursor_store` - 次回の開始日を保存する先
    /// * `operator` - 確認や進捗表示を行う相手
    pub fn new(toggl_client: &'a T, cursor_store: &'a C, operator: &'a O) -> Self {
        Self {
            toggl_client,
            cursor_store,
            operator,
        }
    }

    /// 同期を実行する。
    ///
    /// 期間内のエントリーを取得して絞り込み、日毎のレポートで確認を取ってから
    /// 1件ずつ順番にJiraへ送信する。すべて送信できた場合だけ、送信したエントリーの
    /// 最後の開始日の翌日をカーソルとして保存する。
    ///
    /// 途中で送信に失敗した場合は残りを送信せず、カーソルも更新しない。
    /// そのため次回は同じ期間を再取得し、失敗前に送信済みのエントリーも再送信される。
    ///
    /// # Arguments
    ///
    /// * `window` - 同期する期間
    /// * `credentials` - Jiraへの接続情報
    /// * `connect` - 接続情報からJiraのリポジトリを作る関数
    pub async fn run<J, F>(
        &self,
        window: SyncWindow,
        credentials: JiraCredentials,
        connect: F,
    ) -> Result<SyncOutcome>
    where
        J: JiraRepository,
        F: FnOnce(JiraCredentials) -> Result<J>,
    {
        let (start_date, end_date) = match self.resolve_window(&window)? {
            Some(dates) => dates,
            None => {
                self.operator.show_report(&render_report(&[], 0)?)?;
                return Ok(SyncOutcome::NothingToSync);
            }
        };
        let start_at = midnight(start_date)?;
        let end_at = midnight(end_date)?;
        info!("Start at: {}, End at: {}", start_at, end_at);

        let raw_entries = self
            .toggl_client
            .read_time_entries(&start_at, &end_at)
            .await
            .context("Failed to retrieve time entries")?;
        info!("Time entries retrieved successfully.");

        let skipped = log_dropped_entries(&raw_entries);
        let entries = filter_entries(&raw_entries).context("Failed to filter time entries")?;
        info!(
            "{} of {} time entries selected",
            entries.len(),
            raw_entries.len()
        );

        let report = render_report(&entries, skipped)?;
        if entries.is_empty() {
            self.operator.show_report(&report)?;
            return Ok(SyncOutcome::NothingToSync);
        }

        if !self.operator.confirm(&report)? {
            info!("Sync declined by operator");
            return Ok(SyncOutcome::Aborted);
        }

        let credentials = match credentials.password {
            Some(_) => credentials,
            None => {
                let password = self.operator.prompt_secret("Atlassian ID password")?;
                JiraCredentials {
                    password: Some(password),
                    ..credentials
                }
            }
        };
        let jira_client = connect(credentials).context("Failed to connect to Jira")?;

        let total = entries.len();
        for (index, entry) in entries.iter().enumerate() {
            jira_client
                .create_worklog(&NewWorklog::from(entry))
                .await
                .with_context(|| {
                    format!(
                        "Failed to log time to {} ({} of {} entries already sent, start date not updated)",
                        entry.issue_key, index, total
                    )
                })?;
            info!("Logged {}s to {}", entry.duration_seconds, entry.issue_key);
            if let Err(error) = self.operator.on_entry_posted(index, total, entry) {
                warn!("Failed to show progress: {:#}", error);
            }
        }

        // entriesは空ではないのでmaxは必ず存在する
        let last_date = entries
            .iter()
            .map(|entry| entry.start_time.date_naive())
            .max()
            .context("No entries were posted")?;
        let cursor = last_date + Duration::days(1);
        self.cursor_store
            .write_cursor(cursor)
            .with_context(|| format!("Failed to save start date: {}", cursor))?;

        Ok(SyncOutcome::Synced {
            posted: total,
            cursor,
        })
    }

    /// 期間を確定する。
    ///
    /// 開始日は引数、保存済みのカーソル、昨日の順に決める。終了日の既定値は今日。
    /// カーソルが終了日より後にある場合は、同期済みなので`None`を返す。
    fn resolve_window(&self, window: &SyncWindow) -> Result<Option<(NaiveDate, NaiveDate)>> {
        let end_date = window.end_date.unwrap_or_else(datetime::today);
        let start_date = match window.start_date {
            Some(date) => date,
            None => {
                let stored = self
                    .cursor_store
                    .read_cursor()
                    .context("Failed to read start date")?;
                match stored {
                    Some(date) if date > end_date => {
                        info!("Already synced up to {} (end date {})", date, end_date);
                        return Ok(None);
                    }
                    Some(date) => date,
                    None => datetime::yesterday(),
                }
            }
        };
        if start_date > end_date {
            bail!(
                "Start date {} is after end date {}",
                start_date,
                end_date
            );
        }

        Ok(Some((start_date, end_date)))
    }
}

/// UTCの0時を返す。
fn midnight(date: NaiveDate) -> Result<DateTime<Utc>> {
    Ok(date
        .and_hms_opt(0, 0, 0)
        .with_context(|| format!("Failed to set midnight: {}", date))?
        .and_utc())
}

/// 除外されるエントリーをログに出し、課題キーがないエントリーの数を返す。
fn log_dropped_entries(entries: &[RawTimeEntry]) -> usize {
    entries
        .iter()
        .filter(|entry| match extract_issue_key(&entry.description) {
            None => {
                warn!("Skipping entry without issue key: {:?}", entry.description);
                true
            }
            Some(_) => {
                if entry.duration < MIN_WORKLOG_SECONDS {
                    debug!(
                        "Skipping entry shorter than {}s: {:?}",
                        MIN_WORKLOG_SECONDS, entry.description
                    );
                }
                false
            }
        })
        .count()
}
