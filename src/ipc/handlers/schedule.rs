use chrono::Datelike;
use serde_json::json;

use super::{parse_iso_date, required_str, HandlerErr};
use crate::ipc::error::ok;
use crate::ipc::types::{AppState, Request};
use crate::schedule::{is_scheduled_day, weekday_name, TeacherProfile};

fn is_scheduled(params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let raw_date = required_str(params, "date")?;
    let date = parse_iso_date(&raw_date, "date")?;

    let teacher: Option<TeacherProfile> = match params.get("teacher") {
        None => None,
        Some(v) if v.is_null() => None,
        Some(v) => Some(
            serde_json::from_value(v.clone())
                .map_err(|e| HandlerErr::bad_params(format!("invalid teacher: {}", e)))?,
        ),
    };

    let scheduled = is_scheduled_day(teacher.as_ref(), date);
    Ok(json!({
        "scheduled": scheduled,
        "dayOfWeek": weekday_name(date.weekday())
    }))
}

pub fn try_handle(_state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "schedule.isScheduledDay" => Some(match is_scheduled(&req.params) {
            Ok(result) => ok(&req.id, result),
            Err(e) => e.response(&req.id),
        }),
        _ => None,
    }
}
