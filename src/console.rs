use std::cell::RefCell;
use std::collections::BTreeMap;
use std::io::{BufRead, Write};

use anyhow::{bail, Context, Result};
use chrono::NaiveDate;
use crossterm::event::{self, Event, KeyCode, KeyEvent, KeyEventKind, KeyModifiers};
use crossterm::terminal;
#[cfg(test)]
use mockall::automock;

use crate::time_entry::NormalizedEntry;

/// 秒数を`H:MM:SS`形式の文字列にする。
///
/// 時間は1時間以上の場合のみ表示する。
///
/// # Examples
///
/// ```
/// assert_eq!(format_duration(125), "02:05");
/// assert_eq!(format_duration(3725), "1:02:05");
/// ```
pub fn format_duration(duration: i64) -> String {
    let seconds = duration % 60;
    let minutes = (duration / 60) % 60;
    let hours = duration / 3600;
    let clock = format!("{:02}:{:02}", minutes, seconds);
    if hours > 0 {
        format!("{}:{}", hours, clock)
    } else {
        clock
    }
}

/// 1日分のtime entry。
#[derive(Debug, PartialEq)]
pub struct DayGroup<'a> {
    pub date: NaiveDate,
    pub entries: Vec<&'a NormalizedEntry>,
}

/// time entryを開始日(UTC)ごとにまとめる。
///
/// 日付は昇順に並べ、同じ日のエントリーは入力の順序を保持する。
pub fn group_by_day(entries: &[NormalizedEntry]) -> Vec<DayGroup<'_>> {
    let days: BTreeMap<NaiveDate, Vec<&NormalizedEntry>> =
        entries.iter().fold(BTreeMap::new(), |mut acc, entry| {
            acc.entry(entry.start_time.date_naive())
                .or_default()
                .push(entry);
            acc
        });

    days.into_iter()
        .map(|(date, entries)| DayGroup { date, entries })
        .collect()
}

/// Consoleにtime entryを表示するためのtrait。
pub trait ConsolePresenter {
    /// 送信対象のtime entryを表示する。
    ///
    /// # Arguments
    ///
    /// * `entries` - 表示するtime entry
    /// * `skipped` - 課題キーがないため除外したtime entryの数
    fn show_entries(&mut self, entries: &[NormalizedEntry], skipped: usize) -> Result<()>;
}

/// time entryを日毎にまとめて表示する。
pub struct ConsoleDayReport<'a, W: Write> {
    writer: &'a mut W,
}

impl<'a, W: Write> ConsoleDayReport<'a, W> {
    /// 新しい`ConsoleDayReport`を返す。
    pub fn new(writer: &'a mut W) -> Self {
        Self { writer }
    }
}

impl<'a, W: Write> ConsolePresenter for ConsoleDayReport<'a, W> {
    fn show_entries(&mut self, entries: &[NormalizedEntry], skipped: usize) -> Result<()> {
        if entries.is_empty() {
            writeln!(self.writer, "No entries to log.").context("Failed to write report")?;
        } else {
            writeln!(self.writer, "Log the following entries?").context("Failed to write report")?;
        }

        for day in group_by_day(entries) {
            writeln!(self.writer, "\n{}\n", day.date.format("%Y-%m-%d %A"))
                .with_context(|| format!("Failed to write day header: {}", day.date))?;
            for entry in day.entries {
                writeln!(
                    self.writer,
                    "  {}  {:>8}  {}",
                    entry.start_time.format("%H:%M"),
                    format_duration(entry.duration_seconds),
                    entry.description
                )
                .with_context(|| format!("Failed to write time entry: {:?}", entry))?;
            }
        }

        if skipped > 0 {
            writeln!(
                self.writer,
                "\nSkipped {} entries without an issue key.",
                skipped
            )
            .context("Failed to write report")?;
        }

        Ok(())
    }
}

/// 日毎のレポートを文字列として組み立てる。
pub fn render_report(entries: &[NormalizedEntry], skipped: usize) -> Result<String> {
    let mut buffer = Vec::new();
    ConsoleDayReport::new(&mut buffer).show_entries(entries, skipped)?;
    String::from_utf8(buffer).context("Report is not valid UTF-8")
}

/// 同期中に操作者とやりとりするためのtrait。
#[cfg_attr(test, automock)]
pub trait Operator {
    /// レポートを表示し、Jiraへ送信してよいか確認する。
    fn confirm(&self, report: &str) -> Result<bool>;

    /// 確認を求めずにレポートを表示する。
    fn show_report(&self, report: &str) -> Result<()>;

    /// 値の入力を求める。
    fn prompt(&self, label: &str) -> Result<String>;

    /// パスワードなどの秘密情報の入力を求める。
    fn prompt_secret(&self, label: &str) -> Result<String>;

    /// 1件のworklogを送信したことを通知する。
    fn on_entry_posted(&self, index: usize, total: usize, entry: &NormalizedEntry) -> Result<()>;
}

/// 標準入出力を使う`Operator`。
pub struct ConsoleOperator<R: BufRead, W: Write> {
    reader: RefCell<R>,
    writer: RefCell<W>,
    hide_secrets: bool,
}

impl<R: BufRead, W: Write> ConsoleOperator<R, W> {
    /// 新しい`ConsoleOperator`を返す。
    ///
    /// 秘密情報も`reader`から1行読む。端末で入力を隠すには`with_hidden_secrets`を使う。
    pub fn new(reader: R, writer: W) -> Self {
        Self {
            reader: RefCell::new(reader),
            writer: RefCell::new(writer),
            hide_secrets: false,
        }
    }

    /// 秘密情報を端末からエコーなしで読むようにする。
    pub fn with_hidden_secrets(mut self) -> Self {
        self.hide_secrets = true;
        self
    }

    fn write_prompt(&self, question: &str) -> Result<()> {
        let mut writer = self.writer.borrow_mut();
        write!(writer, "{}", question).context("Failed to write prompt")?;
        writer.flush().context("Failed to flush prompt")
    }

    fn read_answer(&self) -> Result<String> {
        let mut line = String::new();
        self.reader
            .borrow_mut()
            .read_line(&mut line)
            .context("Failed to read answer")?;
        Ok(line.trim().to_string())
    }

    fn ask(&self, question: &str) -> Result<String> {
        self.write_prompt(question)?;
        self.read_answer()
    }
}

impl<R: BufRead, W: Write> Operator for ConsoleOperator<R, W> {
    fn confirm(&self, report: &str) -> Result<bool> {
        write!(self.writer.borrow_mut(), "{}", report).context("Failed to write report")?;
        let answer = self.ask("\nSend to Jira? [y/N]: ")?;
        Ok(matches!(answer.to_lowercase().as_str(), "y" | "yes"))
    }

    fn show_report(&self, report: &str) -> Result<()> {
        let mut writer = self.writer.borrow_mut();
        write!(writer, "{}", report).context("Failed to write report")?;
        writer.flush().context("Failed to flush report")
    }

    fn prompt(&self, label: &str) -> Result<String> {
        self.ask(&format!("{}: ", label))
    }

    fn prompt_secret(&self, label: &str) -> Result<String> {
        self.write_prompt(&format!("{}: ", label))?;
        if !self.hide_secrets {
            return self.read_answer();
        }

        let secret = read_hidden_line();
        writeln!(self.writer.borrow_mut()).context("Failed to write prompt")?;
        secret
    }

    fn on_entry_posted(&self, index: usize, total: usize, entry: &NormalizedEntry) -> Result<()> {
        writeln!(
            self.writer.borrow_mut(),
            "[{}/{}] {} {}",
            index + 1,
            total,
            entry.issue_key,
            format_duration(entry.duration_seconds)
        )
        .with_context(|| format!("Failed to write progress: {}", entry.issue_key))
    }
}

/// 端末をrawモードにして、エコーせずに1行読む。
fn read_hidden_line() -> Result<String> {
    terminal::enable_raw_mode().context("Failed to enable raw mode")?;
    let result = read_keys_until_enter();
    terminal::disable_raw_mode().context("Failed to disable raw mode")?;
    result
}

fn read_keys_until_enter() -> Result<String> {
    let mut secret = String::new();
    loop {
        if let Event::Key(key) = event::read().context("Failed to read key")? {
            if apply_secret_key(&mut secret, &key)? {
                return Ok(secret);
            }
        }
    }
}

/// 1回のキー入力を秘密情報に反映する。Enterで入力が終わったら`true`を返す。
fn apply_secret_key(secret: &mut String, key: &KeyEvent) -> Result<bool> {
    if key.kind == KeyEventKind::Release {
        return Ok(false);
    }
    match key.code {
        KeyCode::Enter => return Ok(true),
        KeyCode::Char('c') if key.modifiers.contains(KeyModifiers::CONTROL) => {
            bail!("Password input interrupted")
        }
        KeyCode::Esc => bail!("Password input interrupted"),
        KeyCode::Backspace => {
            secret.pop();
        }
        KeyCode::Char(c) => secret.push(c),
        _ => {}
    }
    Ok(false)
}
