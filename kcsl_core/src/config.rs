//! Run configuration, read from an optional TOML file.

use std::{
    fs,
    path::{Path, PathBuf},
};

use anyhow::{Context, Result};
use serde::Deserialize;

use crate::assembler::Layout;

static LISTING_URL: &str =
    "http://www.city.kobe.lg.jp/a54017/kosodate/gakko/school/lunch/kyusyoku/kondatehyo.html";
static MIRROR_BASE: &str = "http://hkwi.github.com/kcsl/";
static HOLIDAY_CSV_URL: &str = "https://www8.cao.go.jp/chosei/shukujitsu/syukujitsu.csv";

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// The page linking all menu documents.
    pub listing_url: String,
    /// Root of everything written: calendars, record and `data/`.
    pub docs_dir: PathBuf,
    /// Public url of `docs_dir`.
    pub mirror_base: String,
    /// Relative to `docs_dir`.
    pub record_file: PathBuf,
    /// CSV of public holidays, the Cabinet Office list by default. Without it only the
    /// built-in closures are known.
    pub holiday_csv_url: Option<String>,
    /// Replaces the built-in lexicon.
    pub lexicon: Option<PathBuf>,
    pub layout: Layout,
    pub user_agent: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            listing_url: LISTING_URL.to_string(),
            docs_dir: PathBuf::from("docs"),
            mirror_base: MIRROR_BASE.to_string(),
            record_file: PathBuf::from("record.yml"),
            holiday_csv_url: Some(HOLIDAY_CSV_URL.to_string()),
            lexicon: None,
            layout: Layout::default(),
            user_agent: format!("kcsl/{}", env!("CARGO_PKG_VERSION")),
        }
    }
}

impl Config {
    pub fn load(path: &Path) -> Result<Self> {
        let toml = fs::read_to_string(path)
            .with_context(|| format!("reading config {}", path.display()))?;
        Self::from_toml(&toml).with_context(|| format!("parsing config {}", path.display()))
    }

    pub fn from_toml(toml: &str) -> Result<Self> {
        Ok(toml::from_str(toml)?)
    }

    pub fn record_path(&self) -> PathBuf {
        self.docs_dir.join(&self.record_file)
    }

    /// The calendar file of a group.
    pub fn calendar_path(&self, group: &str) -> PathBuf {
        self.docs_dir.join(format!("{group}.ics"))
    }
}
