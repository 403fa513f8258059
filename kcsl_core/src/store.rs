//! Where documents and everything derived from them are kept.
//!
//! A document `…/<month>-<group>.pdf` is stored as `data/<year>-<month>-<group>.<ext>` both
//! in the local output directory and on the public mirror. The `yml` file next to it holds
//! the menu list and doubles as the hand-written override.

use std::{
    collections::BTreeMap,
    fs,
    io::ErrorKind,
    path::{Path, PathBuf},
};

use anyhow::{Context, Result};
use chrono::{DateTime, NaiveDate, NaiveDateTime};
use once_cell::sync::Lazy;
use regex::Regex;
use reqwest::Url;
use serde::{Deserialize, Serialize};

use crate::{
    assembler::MenuList, business_days::year_for, calendar::MenuMonth, error::MenuError,
};

static FILE_NAME: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(\d+)-(.+)\.pdf$").expect("valid document name regex"));

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PdfStore {
    menu_month: MenuMonth,
}

impl PdfStore {
    /// Name the document behind `url`, resolving its year as seen from `reference`.
    pub fn from_url(url: &str, reference: NaiveDate) -> Result<Self, MenuError> {
        let malformed = || MenuError::MalformedUrl(url.to_string());
        let parsed = Url::parse(url).map_err(|_| malformed())?;
        let name = parsed
            .path_segments()
            .and_then(|mut segments| segments.next_back())
            .ok_or_else(malformed)?;
        let captures = FILE_NAME.captures(name).ok_or_else(malformed)?;
        let month: u32 = captures[1].parse().map_err(|_| malformed())?;
        if !(1..=12).contains(&month) {
            return Err(malformed());
        }
        Ok(Self {
            menu_month: MenuMonth::new(year_for(month, reference), month, &captures[2]),
        })
    }

    pub fn menu_month(&self) -> &MenuMonth {
        &self.menu_month
    }

    pub fn group(&self) -> &str {
        &self.menu_month.group
    }

    pub fn path(&self, ext: &str) -> String {
        let MenuMonth { year, month, group } = &self.menu_month;
        format!("data/{year:04}-{month:02}-{group}.{ext}")
    }

    pub fn local(&self, docs_dir: &Path, ext: &str) -> PathBuf {
        docs_dir.join(self.path(ext))
    }

    pub fn remote(&self, mirror_base: &str, ext: &str) -> String {
        format!("{}/{}", mirror_base.trim_end_matches('/'), self.path(ext))
    }
}

impl From<MenuMonth> for PdfStore {
    fn from(menu_month: MenuMonth) -> Self {
        Self { menu_month }
    }
}

/// What is known about one source document.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentRecord {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mirror: Option<String>,
    /// The `Last-Modified` header of the last download, verbatim.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_modified: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub table: Option<String>,
}

impl DocumentRecord {
    pub fn last_modified_at(&self) -> Option<NaiveDateTime> {
        let value = self.last_modified.as_deref()?;
        DateTime::parse_from_rfc2822(value)
            .ok()
            .map(|timestamp| timestamp.naive_utc())
    }
}

/// Source document url to record.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Record {
    documents: BTreeMap<String, DocumentRecord>,
}

impl Record {
    pub fn load(path: &Path) -> Result<Self> {
        match fs::read_to_string(path) {
            Ok(yaml) => serde_yaml::from_str(&yaml)
                .with_context(|| format!("parsing record {}", path.display())),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(Self::default()),
            Err(err) => Err(err).with_context(|| format!("reading record {}", path.display())),
        }
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, serde_yaml::to_string(self)?)
            .with_context(|| format!("writing record {}", path.display()))
    }

    pub fn get(&self, url: &str) -> Option<&DocumentRecord> {
        self.documents.get(url)
    }

    pub fn entry(&mut self, url: &str) -> &mut DocumentRecord {
        self.documents.entry(url.to_string()).or_default()
    }
}

/// The menu list kept in `path`, if there is one.
pub fn read_menus(path: &Path) -> Result<Option<MenuList>> {
    match fs::read_to_string(path) {
        Ok(yaml) => serde_yaml::from_str(&yaml)
            .map(Some)
            .with_context(|| format!("parsing menu file {}", path.display())),
        Err(err) if err.kind() == ErrorKind::NotFound => Ok(None),
        Err(err) => Err(err).with_context(|| format!("reading menu file {}", path.display())),
    }
}

pub fn write_menus(path: &Path, menus: &MenuList) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::write(path, serde_yaml::to_string(menus)?)
        .with_context(|| format!("writing menu file {}", path.display()))
}
