//! This crate turns the school lunch menus of Kobe into one iCalendar file per group.
//!
//! The menus are published as PDF tables on
//! <http://www.city.kobe.lg.jp/a54017/kosodate/gakko/school/lunch/kyusyoku/kondatehyo.html>.

pub use ical;

pub mod assembler;
pub mod business_days;
pub mod calendar;
pub mod config;
pub mod error;
pub mod grid;
pub mod holidays;
pub mod lexicon;
pub mod menu_client;
pub mod pdf_table;
pub mod pipeline;
pub mod store;
pub mod tokenizer;
