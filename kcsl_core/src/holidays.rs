//! Days without school lunch.
//!
//! The set is built once per run from the national holiday list published by the Cabinet
//! Office, plus the school closures which are listed here by hand.

use std::collections::BTreeSet;

use anyhow::{Context, Result};
use chrono::NaiveDate;
use encoding_rs::SHIFT_JIS;
use once_cell::sync::Lazy;
use regex::Regex;
use reqwest::Client;
use tracing::info;

static DATE_FIELD: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(\d{4})/(\d+)/(\d+)").expect("valid holiday date regex"));

/// School closures and holidays as (year, month, first day, last day).
static SUPPLEMENTARY: [(i32, u32, u32, u32); 48] = [
    (2016, 11, 3, 3),
    (2016, 11, 23, 23),
    (2016, 12, 22, 31),
    (2017, 1, 1, 10),
    (2017, 3, 20, 20),
    (2017, 3, 22, 31),
    (2017, 4, 1, 16),
    (2017, 5, 3, 7),
    (2017, 7, 17, 17),
    (2017, 7, 21, 31),
    (2017, 9, 1, 1),
    (2017, 9, 18, 18),
    (2017, 10, 9, 9),
    (2017, 11, 3, 3),
    (2017, 11, 23, 23),
    (2017, 12, 23, 31),
    (2018, 1, 1, 9),
    (2018, 2, 12, 12),
    (2018, 3, 20, 31),
    (2018, 4, 1, 12),
    (2018, 4, 30, 30),
    (2018, 5, 3, 6),
    (2018, 7, 16, 16),
    (2018, 7, 20, 31),
    (2018, 9, 1, 4),
    (2018, 9, 17, 17),
    (2018, 9, 24, 24),
    (2018, 10, 8, 8),
    (2018, 11, 23, 23),
    (2018, 12, 22, 31),
    (2019, 1, 1, 7),
    (2019, 1, 14, 14),
    (2019, 2, 11, 11),
    (2019, 3, 20, 31),
    (2019, 4, 1, 11),
    (2019, 4, 29, 30),
    (2019, 5, 1, 6),
    (2019, 7, 15, 15),
    (2019, 7, 19, 31),
    (2019, 9, 1, 2),
    (2019, 9, 16, 16),
    (2019, 9, 23, 23),
    (2019, 10, 14, 14),
    (2019, 10, 22, 22),
    (2019, 11, 4, 4),
    (2019, 12, 25, 31),
    (2020, 1, 1, 7),
    (2020, 1, 13, 13),
];

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HolidaySet {
    dates: BTreeSet<NaiveDate>,
}

impl HolidaySet {
    /// Only the hand-maintained closures.
    pub fn supplementary() -> Self {
        let dates = SUPPLEMENTARY
            .iter()
            .flat_map(|&(year, month, first, last)| {
                (first..=last).filter_map(move |day| NaiveDate::from_ymd_opt(year, month, day))
            })
            .collect();
        Self { dates }
    }

    /// The closures plus, if `url` is given, the published holiday list.
    pub async fn load(client: &Client, url: Option<&str>) -> Result<Self> {
        let mut holidays = Self::supplementary();
        if let Some(url) = url {
            let body = client
                .get(url)
                .send()
                .await
                .and_then(|response| response.error_for_status())
                .with_context(|| format!("fetching holidays from {url}"))?
                .bytes()
                .await?;
            let added = holidays
                .extend_from_csv(&body)
                .with_context(|| format!("reading holidays from {url}"))?;
            info!(url, added, "loaded holidays");
        }
        Ok(holidays)
    }

    /// Add every `YYYY/M/D` field of a Shift_JIS encoded CSV file.
    pub fn extend_from_csv(&mut self, bytes: &[u8]) -> Result<usize> {
        let (text, _) = SHIFT_JIS.decode_without_bom_handling(bytes);
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(false)
            .flexible(true)
            .from_reader(text.as_bytes());
        let before = self.dates.len();
        for record in reader.records() {
            for field in record?.iter() {
                let Some(captures) = DATE_FIELD.captures(field) else {
                    continue;
                };
                let (Some(year), Some(month), Some(day)) = (
                    captures[1].parse().ok(),
                    captures[2].parse().ok(),
                    captures[3].parse().ok(),
                ) else {
                    continue;
                };
                if let Some(date) = NaiveDate::from_ymd_opt(year, month, day) {
                    self.dates.insert(date);
                }
            }
        }
        Ok(self.dates.len() - before)
    }

    pub fn contains(&self, date: &NaiveDate) -> bool {
        self.dates.contains(date)
    }

    pub fn iter(&self) -> impl Iterator<Item = &NaiveDate> {
        self.dates.iter()
    }

    pub fn len(&self) -> usize {
        self.dates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.dates.is_empty()
    }
}

impl FromIterator<NaiveDate> for HolidaySet {
    fn from_iter<T: IntoIterator<Item = NaiveDate>>(iter: T) -> Self {
        Self {
            dates: iter.into_iter().collect(),
        }
    }
}
