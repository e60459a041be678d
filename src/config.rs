use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::NaiveDate;
use log::{debug, info};
#[cfg(test)]
use mockall::automock;
use serde::{Deserialize, Serialize};

/// 設定ファイルの名前。
pub const CONFIG_FILE_NAME: &str = ".jiggls.json";

/// Togglの設定。
#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize)]
pub struct TogglConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
}

/// Jiraの設定。
#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize)]
pub struct JiraConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub server: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
}

/// 設定ファイルの内容。
#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub toggl: TogglConfig,
    #[serde(default)]
    pub jira: JiraConfig,
    /// 次回の同期を開始する日付
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_date: Option<NaiveDate>,
}

/// 同期済みの日付を永続化するためのtrait。
#[cfg_attr(test, automock)]
pub trait CursorStore {
    /// 保存されている次回の開始日を読み込む。
    fn read_cursor(&self) -> Result<Option<NaiveDate>>;

    /// 次回の開始日を書き込む。
    fn write_cursor(&self, date: NaiveDate) -> Result<()>;
}

/// JSON形式の設定ファイル。
#[derive(Clone, Debug)]
pub struct ConfigFile {
    path: PathBuf,
}

impl ConfigFile {
    /// 指定されたパスの設定ファイルを返す。
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// 設定ファイルを探す。
    ///
    /// `explicit`が指定されていればそれを使い、なければカレントディレクトリ、
    /// ホームディレクトリの順に探す。どこにもない場合はホームディレクトリのパスを返す。
    pub fn locate(explicit: Option<PathBuf>) -> Result<Self> {
        if let Some(path) = explicit {
            return Ok(Self::new(path));
        }

        let home = dirs::home_dir()
            .context("Failed to find home directory")?
            .join(CONFIG_FILE_NAME);
        let found = [PathBuf::from(CONFIG_FILE_NAME), home.clone()]
            .into_iter()
            .find(|path| path.is_file())
            .unwrap_or(home);
        debug!("Config file: {}", found.display());

        Ok(Self::new(found))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// 設定を読み込む。ファイルがない場合は空の設定を返す。
    pub fn load(&self) -> Result<Config> {
        if !self.path.exists() {
            return Ok(Config::default());
        }

        let content = fs::read_to_string(&self.path)
            .with_context(|| format!("Failed to read config file: {}", self.path.display()))?;
        serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", self.path.display()))
    }

    /// 設定を書き込む。
    ///
    /// 一時ファイルに書いてから置き換えるため、途中で失敗しても元のファイルは壊れない。
    pub fn save(&self, config: &Config) -> Result<()> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create directory: {}", parent.display()))?;
        }

        let content =
            serde_json::to_string_pretty(config).context("Failed to serialize config")?;
        let mut tmp_name = self.path.as_os_str().to_os_string();
        tmp_name.push(".tmp");
        let tmp_path = PathBuf::from(tmp_name);
        fs::write(&tmp_path, content)
            .with_context(|| format!("Failed to write config file: {}", tmp_path.display()))?;
        fs::rename(&tmp_path, &self.path)
            .with_context(|| format!("Failed to replace config file: {}", self.path.display()))?;

        Ok(())
    }
}

impl CursorStore for ConfigFile {
    fn read_cursor(&self) -> Result<Option<NaiveDate>> {
        Ok(self.load()?.start_date)
    }

    fn write_cursor(&self, date: NaiveDate) -> Result<()> {
        let mut config = self.load()?;
        config.start_date = Some(date);
        self.save(&config)?;
        info!("Saved start date {} to {}", date, self.path.display());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::fs;

    use chrono::NaiveDate;
    use tempfile::tempdir;

    use super::{Config, ConfigFile, CursorStore, JiraConfig, TogglConfig};

    #[test]
    fn test_load_missing_file() {
        let dir = tempdir().unwrap();
        let file = ConfigFile::new(dir.path().join("missing.json"));

        assert_eq!(file.load().unwrap(), Config::default());
        assert_eq!(file.read_cursor().unwrap(), None);
    }

    #[test]
    fn test_load() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.json");
        fs::write(
            &path,
            r#"{"toggl": {"token": "t"}, "jira": {"server": "acme", "username": "alice"}, "start_date": "2024-01-02"}"#,
        )
        .unwrap();

        let config = ConfigFile::new(&path).load().unwrap();

        assert_eq!(
            config,
            Config {
                toggl: TogglConfig {
                    token: Some("t".to_string())
                },
                jira: JiraConfig {
                    server: Some("acme".to_string()),
                    username: Some("alice".to_string()),
                    password: None,
                },
                start_date: NaiveDate::from_ymd_opt(2024, 1, 2),
            }
        );
    }

    #[test]
    fn test_load_invalid_json() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.json");
        fs::write(&path, "{not json").unwrap();

        let error = ConfigFile::new(&path).load().unwrap_err();

        assert!(error.to_string().contains("config.json"));
    }

    /// カーソルの書き込みで他の設定が消えないことを確認する。
    #[test]
    fn test_write_cursor_keeps_other_settings() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.json");
        fs::write(&path, r#"{"jira": {"server": "acme"}, "start_date": "2024-01-01"}"#).unwrap();
        let file = ConfigFile::new(&path);

        file.write_cursor(NaiveDate::from_ymd_opt(2024, 1, 5).unwrap())
            .unwrap();

        let config = file.load().unwrap();
        assert_eq!(config.start_date, NaiveDate::from_ymd_opt(2024, 1, 5));
        assert_eq!(config.jira.server.as_deref(), Some("acme"));
        assert!(!dir.path().join("config.json.tmp").exists());
    }

    #[test]
    fn test_write_cursor_creates_file() {
        let dir = tempdir().unwrap();
        let file = ConfigFile::new(dir.path().join("nested").join("config.json"));

        file.write_cursor(NaiveDate::from_ymd_opt(2024, 1, 2).unwrap())
            .unwrap();

        assert_eq!(
            file.read_cursor().unwrap(),
            NaiveDate::from_ymd_opt(2024, 1, 2)
        );
    }

    #[test]
    fn test_locate_explicit() {
        let file = ConfigFile::locate(Some("custom.json".into())).unwrap();

        assert_eq!(file.path(), std::path::Path::new("custom.json"));
    }
}
