//! Maps a menu month onto the school days it is served on.

use chrono::{Datelike, NaiveDate};

use crate::holidays::HolidaySet;

/// Weekdays of the month which are not in `holidays`, in ascending order.
///
/// An invalid month yields no days.
pub fn business_days(year: i32, month: u32, holidays: &HolidaySet) -> Vec<NaiveDate> {
    let Some(head) = NaiveDate::from_ymd_opt(year, month, 1) else {
        return vec![];
    };
    head.iter_days()
        .take(31)
        .filter(|day| day.year() == head.year() && day.month() == head.month())
        .filter(|day| day.weekday().number_from_monday() < 6)
        .filter(|day| !holidays.contains(day))
        .collect()
}

/// The year a month-only label refers to, seen from `reference`.
///
/// Menus are published shortly before their month, so a January menu found in autumn is
/// for next year and a December menu found in winter is for last year.
pub fn year_for(month: u32, reference: NaiveDate) -> i32 {
    if reference.month() > 9 && month < 3 {
        reference.year() + 1
    } else if reference.month() < 3 && month > 9 {
        reference.year() - 1
    } else {
        reference.year()
    }
}

#[cfg(test)]
mod tests {
    use std::str::FromStr;

    use chrono::{Datelike, NaiveDate};
    use proptest::prelude::*;

    use crate::{
        business_days::{business_days, year_for},
        holidays::HolidaySet,
    };

    fn date(value: &str) -> NaiveDate {
        NaiveDate::from_str(value).unwrap()
    }

    #[test]
    fn test_year_for() {
        assert_eq!(year_for(1, date("2017-02-01")), 2017);
        assert_eq!(year_for(2, date("2017-02-01")), 2017);
        assert_eq!(year_for(3, date("2017-02-01")), 2017);
        assert_eq!(year_for(11, date("2016-11-01")), 2016);
        assert_eq!(year_for(11, date("2016-12-01")), 2016);
        assert_eq!(year_for(11, date("2017-01-01")), 2016);
        assert_eq!(year_for(6, date("2017-07-01")), 2017);
        assert_eq!(year_for(6, date("2017-06-01")), 2017);
        assert_eq!(year_for(6, date("2017-05-01")), 2017);
        assert_eq!(year_for(1, date("2018-12-01")), 2019);
        assert_eq!(year_for(12, date("2019-01-01")), 2018);
    }

    #[test]
    fn test_business_days_january_2019() {
        let days = business_days(2019, 1, &HolidaySet::supplementary());
        // 1st-7th winter break, 14th Coming of Age Day
        assert_eq!(days.first(), Some(&date("2019-01-08")));
        assert!(!days.contains(&date("2019-01-14")));
        assert!(!days.contains(&date("2019-01-12")));
        assert_eq!(days.last(), Some(&date("2019-01-31")));
        assert_eq!(days.len(), 17);
    }

    #[test]
    fn test_business_days_invalid_month() {
        assert!(business_days(2019, 13, &HolidaySet::default()).is_empty());
    }

    proptest! {
        #[test]
        fn test_business_days_properties(year in 1990i32..2100, month in 1u32..=12) {
            let holidays = HolidaySet::supplementary();
            let days = business_days(year, month, &holidays);
            prop_assert!(days.len() <= 23);
            prop_assert!(days.windows(2).all(|pair| pair[0] < pair[1]));
            for day in &days {
                prop_assert_eq!((day.year(), day.month()), (year, month));
                prop_assert!(day.weekday().number_from_monday() < 6);
                prop_assert!(!holidays.contains(day));
            }
        }
    }
}
