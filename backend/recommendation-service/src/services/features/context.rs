use chrono::{Datelike, NaiveDateTime, Timelike};

use crate::models::{FeatureContext, Season, TimeOfDay};

pub const UNKNOWN_DEVICE: &str = "unknown";

pub fn season_for_month(month: u32) -> Season {
    match month {
        12 | 1 | 2 => Season::Winter,
        3..=5 => Season::Spring,
        6..=8 => Season::Summer,
        _ => Season::Autumn,
    }
}

pub fn time_of_day_for_hour(hour: u32) -> TimeOfDay {
    match hour {
        0..=5 => TimeOfDay::Night,
        6..=11 => TimeOfDay::Morning,
        12..=17 => TimeOfDay::Afternoon,
        _ => TimeOfDay::Evening,
    }
}

/// M = 0, FE = 1, O = 2, anything else = 3
pub fn gender_code(gender: Option<&str>) -> u8 {
    match gender {
        Some("M") => 0,
        Some("FE") => 1,
        Some("O") => 2,
        _ => 3,
    }
}

pub fn derive_context(now: NaiveDateTime, device_type: Option<&str>, gender: Option<&str>) -> FeatureContext {
    let hour = now.hour();
    let month = now.month();
    let day_of_week = now.weekday().number_from_monday();

    FeatureContext {
        hour,
        day_of_week,
        month,
        season: season_for_month(month),
        time_of_day: time_of_day_for_hour(hour),
        is_weekend: day_of_week >= 6,
        device_type: device_type
            .filter(|d| !d.is_empty())
            .unwrap_or(UNKNOWN_DEVICE)
            .to_string(),
        gender: gender.map(str::to_string),
        gender_code: gender_code(gender),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn at(y: i32, m: u32, d: u32, h: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(y, m, d)
            .unwrap()
            .and_hms_opt(h, 0, 0)
            .unwrap()
    }

    #[test]
    fn test_season_boundaries() {
        assert_eq!(season_for_month(12), Season::Winter);
        assert_eq!(season_for_month(2), Season::Winter);
        assert_eq!(season_for_month(3), Season::Spring);
        assert_eq!(season_for_month(8), Season::Summer);
        assert_eq!(season_for_month(9), Season::Autumn);
        assert_eq!(season_for_month(11), Season::Autumn);
    }

    #[test]
    fn test_time_of_day_boundaries() {
        assert_eq!(time_of_day_for_hour(5), TimeOfDay::Night);
        assert_eq!(time_of_day_for_hour(6), TimeOfDay::Morning);
        assert_eq!(time_of_day_for_hour(12), TimeOfDay::Afternoon);
        assert_eq!(time_of_day_for_hour(18), TimeOfDay::Evening);
    }

    #[test]
    fn test_weekend_and_gender() {
        // 2024-06-15 is a Saturday
        let ctx = derive_context(at(2024, 6, 15, 20), Some("mobile"), Some("FE"));
        assert_eq!(ctx.day_of_week, 6);
        assert!(ctx.is_weekend);
        assert_eq!(ctx.season, Season::Summer);
        assert_eq!(ctx.time_of_day, TimeOfDay::Evening);
        assert_eq!(ctx.device_type, "mobile");
        assert_eq!(ctx.gender_code, 1);

        let weekday = derive_context(at(2024, 6, 14, 9), None, Some("X"));
        assert!(!weekday.is_weekend);
        assert_eq!(weekday.device_type, UNKNOWN_DEVICE);
        assert_eq!(weekday.gender_code, 3);
    }
}
