use chrono::{Datelike, NaiveDate, Weekday};
use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AvailabilitySlot {
    /// Full weekday name, e.g. "Monday". Matched case-insensitively.
    pub day: String,
    #[serde(default)]
    pub from_time: Option<String>,
    #[serde(default)]
    pub to_time: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TeacherProfile {
    pub id: String,
    #[serde(default)]
    pub availability: Option<Vec<AvailabilitySlot>>,
}

pub fn weekday_name(day: Weekday) -> &'static str {
    match day {
        Weekday::Mon => "Monday",
        Weekday::Tue => "Tuesday",
        Weekday::Wed => "Wednesday",
        Weekday::Thu => "Thursday",
        Weekday::Fri => "Friday",
        Weekday::Sat => "Saturday",
        Weekday::Sun => "Sunday",
    }
}

/// Whether the teacher is expected to hold a session on `date`.
///
/// Weekends are always scheduled: the centre treats Saturday and Sunday as
/// makeup/flex days regardless of availability. Weekdays are scheduled only
/// when an availability slot names that weekday; a missing teacher or empty
/// availability list is never scheduled on a weekday.
pub fn is_scheduled_day(teacher: Option<&TeacherProfile>, date: NaiveDate) -> bool {
    let weekday = date.weekday();
    if weekday == Weekday::Sat || weekday == Weekday::Sun {
        return true;
    }
    let Some(slots) = teacher.and_then(|t| t.availability.as_ref()) else {
        return false;
    };
    let name = weekday_name(weekday);
    slots
        .iter()
        .any(|slot| slot.day.trim().eq_ignore_ascii_case(name))
}
