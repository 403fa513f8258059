//! Keeps the per-group iCalendar files up to date with the menus.
//!
//! Every school day is one all-day event with the uid `<date>@<group>`. The file is read
//! completely, changed in memory and written back completely.

use std::{
    collections::BTreeSet,
    fmt, fs,
    io::{BufReader, Cursor, ErrorKind},
    path::Path,
};

use anyhow::{Context, Result};
use chrono::{NaiveDate, NaiveDateTime};
use ical::{
    generator::{IcalCalendar, IcalCalendarBuilder, IcalEvent, Property},
    ical_param, ical_property,
    parser::ical::component::{IcalAlarm, IcalTimeZoneTransitionType},
    IcalParser,
};
use once_cell::sync::Lazy;
use regex::Regex;
use tracing::{debug, warn};

use crate::{assembler::MenuEntry, error::MenuError};

static PROD_ID: &str = "-//kcsl";
static DATE_FORMAT: &str = "%Y%m%d";
static STAMP_FORMAT: &str = "%Y%m%dT%H%M%SZ";
const LINE_OCTETS: usize = 75;
static UID: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(\d{4})-(\d{2})-(\d{2})@(.+)$").expect("valid uid regex"));

/// The (year, month, group) of a menu document.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct MenuMonth {
    pub year: i32,
    pub month: u32,
    pub group: String,
}

impl MenuMonth {
    pub fn new(year: i32, month: u32, group: impl Into<String>) -> Self {
        Self {
            year,
            month,
            group: group.into(),
        }
    }

    /// The month an event uid belongs to.
    pub fn from_uid(uid: &str) -> Result<Self, MenuError> {
        let malformed = || MenuError::MalformedUid(uid.to_string());
        let captures = UID.captures(uid).ok_or_else(malformed)?;
        Ok(Self {
            year: captures[1].parse().map_err(|_| malformed())?,
            month: captures[2].parse().map_err(|_| malformed())?,
            group: captures[4].to_string(),
        })
    }
}

impl fmt::Display for MenuMonth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04}-{:02}-{}", self.year, self.month, self.group)
    }
}

/// What a merge did to the calendar.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MergeStats {
    pub created: usize,
    pub updated: usize,
    pub unchanged: usize,
    /// Days taken by an event of another group or month.
    pub skipped: usize,
}

trait GetIcalProperty {
    fn get_ical_property_value(&self, name: &str) -> Option<&String>;
}

impl GetIcalProperty for IcalEvent {
    fn get_ical_property_value(&self, name: &str) -> Option<&String> {
        self.properties
            .iter()
            .find(|property| property.name == name)
            .and_then(|property| property.value.as_ref())
    }
}

#[derive(Debug, Clone)]
pub struct GroupCalendar {
    calendar: IcalCalendar,
}

impl GroupCalendar {
    pub fn new(group: &str) -> Self {
        let calendar = IcalCalendarBuilder::version("2.0")
            .gregorian()
            .prodid(format!("{PROD_ID}//{group}"))
            .build();
        Self { calendar }
    }

    /// Read the calendar file of `group`, starting an empty calendar if there is none yet.
    pub fn load(path: &Path, group: &str) -> Result<Self> {
        match fs::read_to_string(path) {
            Ok(ics) => Self::parse(&ics, group)
                .with_context(|| format!("parsing calendar {}", path.display())),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(Self::new(group)),
            Err(err) => {
                Err(err).with_context(|| format!("reading calendar {}", path.display()))
            }
        }
    }

    pub fn parse(ics: &str, group: &str) -> Result<Self> {
        let mut parser = IcalParser::new(BufReader::new(Cursor::new(ics)));
        match parser.next() {
            Some(calendar) => Ok(Self {
                calendar: calendar?,
            }),
            None => Ok(Self::new(group)),
        }
    }

    pub fn events(&self) -> &[IcalEvent] {
        &self.calendar.events
    }

    /// Put one event per day into the calendar.
    ///
    /// An existing event of the same month and group is rewritten only if its text changed.
    /// A day already taken by another event is left alone.
    pub fn merge(
        &mut self,
        menu_month: &MenuMonth,
        days: &[NaiveDate],
        menus: &[MenuEntry],
        stamp: NaiveDateTime,
    ) -> MergeStats {
        let mut stats = MergeStats::default();
        for (day, entry) in days.iter().zip(menus) {
            let summary = entry.join(",");
            let description = entry.join("\n");
            let mut own = None;
            let mut taken = false;
            for (index, event) in self.calendar.events.iter().enumerate() {
                if event_date(event).as_ref() != Some(day) {
                    continue;
                }
                let event_month = event
                    .get_ical_property_value("UID")
                    .and_then(|uid| MenuMonth::from_uid(uid).ok());
                if event_month.as_ref() == Some(menu_month) {
                    own = Some(index);
                } else {
                    taken = true;
                }
            }
            match own {
                Some(index) => {
                    let event = &mut self.calendar.events[index];
                    let text = |name: &str| event.get_ical_property_value(name).map(|v| unescape(v));
                    if text("SUMMARY").as_deref() == Some(summary.as_str())
                        && text("DESCRIPTION").as_deref() == Some(description.as_str())
                    {
                        stats.unchanged += 1;
                    } else {
                        debug!(%day, group = menu_month.group, "updating event");
                        event.properties =
                            event_properties(*day, &menu_month.group, &summary, &description, stamp);
                        stats.updated += 1;
                    }
                }
                None if taken => {
                    warn!(%day, group = menu_month.group, "day is taken by another event, skipping");
                    stats.skipped += 1;
                }
                None => {
                    debug!(%day, group = menu_month.group, "creating event");
                    let mut event = IcalEvent::new();
                    event.properties =
                        event_properties(*day, &menu_month.group, &summary, &description, stamp);
                    self.calendar.events.push(event);
                    stats.created += 1;
                }
            }
        }
        stats
    }

    /// Every menu month referenced by the events of this calendar.
    pub fn menu_months(&self) -> Result<BTreeSet<MenuMonth>, MenuError> {
        self.calendar
            .events
            .iter()
            .filter_map(|event| event.get_ical_property_value("UID"))
            .map(|uid| MenuMonth::from_uid(uid))
            .collect()
    }

    /// The calendar as iCalendar text with CRLF line ends and lines folded at 75 octets.
    pub fn render(&self) -> String {
        let calendar = &self.calendar;
        let mut text = String::new();
        begin(&mut text, "VCALENDAR", &calendar.properties);
        for timezone in &calendar.timezones {
            begin(&mut text, "VTIMEZONE", &timezone.properties);
            for transition in &timezone.transitions {
                let key = match transition.transition {
                    IcalTimeZoneTransitionType::STANDARD => "STANDARD",
                    IcalTimeZoneTransitionType::DAYLIGHT => "DAYLIGHT",
                };
                begin(&mut text, key, &transition.properties);
                end(&mut text, key);
            }
            end(&mut text, "VTIMEZONE");
        }
        for event in &calendar.events {
            begin(&mut text, "VEVENT", &event.properties);
            alarms(&mut text, &event.alarms);
            end(&mut text, "VEVENT");
        }
        alarms(&mut text, &calendar.alarms);
        for todo in &calendar.todos {
            begin(&mut text, "VTODO", &todo.properties);
            alarms(&mut text, &todo.alarms);
            end(&mut text, "VTODO");
        }
        for journal in &calendar.journals {
            begin(&mut text, "VJOURNAL", &journal.properties);
            end(&mut text, "VJOURNAL");
        }
        for free_busy in &calendar.free_busys {
            begin(&mut text, "VFREEBUSY", &free_busy.properties);
            end(&mut text, "VFREEBUSY");
        }
        end(&mut text, "VCALENDAR");
        text
    }

    pub fn write(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, self.render())
            .with_context(|| format!("writing calendar {}", path.display()))
    }
}

fn begin(text: &mut String, key: &str, properties: &[Property]) {
    text.push_str(&fold(&format!("BEGIN:{key}")));
    for property in properties {
        text.push_str(&fold(&content_line(property)));
    }
}

fn end(text: &mut String, key: &str) {
    text.push_str(&fold(&format!("END:{key}")));
}

fn alarms(text: &mut String, alarms: &[IcalAlarm]) {
    for alarm in alarms {
        begin(text, "VALARM", &alarm.properties);
        end(text, "VALARM");
    }
}

fn content_line(property: &Property) -> String {
    let mut line = property.name.clone();
    for (name, values) in property.params.iter().flatten() {
        let values: Vec<String> = values.iter().map(|value| quote_param(value)).collect();
        line.push_str(&format!(";{name}={}", values.join(",")));
    }
    line.push(':');
    line.push_str(property.value.as_deref().unwrap_or_default());
    line
}

fn quote_param(value: &str) -> String {
    if value.contains([':', ';', ',']) && !value.starts_with('"') {
        format!("\"{value}\"")
    } else {
        value.to_string()
    }
}

/// Fold a content line into physical lines of at most 75 octets, never inside a character.
///
/// A physical line never ends in whitespace, the parser trims it.
fn fold(line: &str) -> String {
    let mut folded = String::with_capacity(line.len() + line.len() / 24 + 2);
    let mut width = 0;
    for c in line.chars() {
        let needed = c.len_utf8() + usize::from(c.is_whitespace());
        if width + needed > LINE_OCTETS && width > 1 {
            folded.push_str("\r\n ");
            width = 1;
        }
        folded.push(c);
        width += c.len_utf8();
    }
    folded.push_str("\r\n");
    folded
}

fn event_date(event: &IcalEvent) -> Option<NaiveDate> {
    let start = event.get_ical_property_value("DTSTART")?;
    NaiveDate::parse_from_str(start.get(0..8)?, DATE_FORMAT).ok()
}

fn event_properties(
    day: NaiveDate,
    group: &str,
    summary: &str,
    description: &str,
    stamp: NaiveDateTime,
) -> Vec<Property> {
    vec![
        ical_property!("UID", format!("{}@{group}", day.format("%Y-%m-%d"))),
        ical_property!("DTSTAMP", stamp.format(STAMP_FORMAT).to_string()),
        ical_property!(
            "DTSTART",
            day.format(DATE_FORMAT).to_string(),
            ical_param!("VALUE", "DATE")
        ),
        ical_property!("SUMMARY", escape(summary)),
        ical_property!("DESCRIPTION", escape(description)),
    ]
}

/// Escape a TEXT value.
fn escape(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '\\' => escaped.push_str("\\\\"),
            ';' => escaped.push_str("\\;"),
            ',' => escaped.push_str("\\,"),
            '\n' => escaped.push_str("\\n"),
            other => escaped.push(other),
        }
    }
    escaped
}

fn unescape(value: &str) -> String {
    let mut text = String::with_capacity(value.len());
    let mut chars = value.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            text.push(c);
            continue;
        }
        match chars.next() {
            Some('n' | 'N') => text.push('\n'),
            Some(other) => text.push(other),
            None => text.push('\\'),
        }
    }
    text
}
