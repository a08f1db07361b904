use chrono::{NaiveDate, Utc};
use serde_json::json;

use super::{required_date, required_str, required_year_month, store_ref, HandlerErr};
use crate::calc;
use crate::ipc::error::ok;
use crate::ipc::types::{AppState, Request};
use crate::store::AttendanceStore;

fn optional_teacher_filter(params: &serde_json::Value) -> Result<Option<String>, HandlerErr> {
    match params.get("teacherId") {
        None => Ok(None),
        Some(v) if v.is_null() => Ok(None),
        Some(v) => v
            .as_str()
            .map(|s| Some(s.to_string()))
            .ok_or_else(|| HandlerErr::bad_params("teacherId must be a string")),
    }
}

fn window_params(params: &serde_json::Value) -> Result<(NaiveDate, u32), HandlerErr> {
    let days = params
        .get("days")
        .and_then(|v| v.as_u64())
        .ok_or_else(|| HandlerErr::bad_params("missing days"))?;
    if !(1..=366).contains(&days) {
        return Err(HandlerErr::bad_params("days must be between 1 and 366"));
    }
    let as_of = match params.get("asOf") {
        None => Utc::now().date_naive(),
        Some(v) if v.is_null() => Utc::now().date_naive(),
        Some(v) => {
            let raw = v
                .as_str()
                .ok_or_else(|| HandlerErr::bad_params("asOf must be a YYYY-MM-DD date"))?;
            super::parse_iso_date(raw, "asOf")?
        }
    };
    Ok((as_of, days as u32))
}

fn by_subject(
    store: &AttendanceStore,
    params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    let mut records = store.load();
    if let Some(teacher_id) = optional_teacher_filter(params)? {
        records.retain(|r| r.teacher_id == teacher_id);
    }
    Ok(json!({ "subjects": calc::summarize_by_subject(&records) }))
}

fn by_teacher(store: &AttendanceStore) -> Result<serde_json::Value, HandlerErr> {
    let records = store.load();
    Ok(json!({ "teachers": calc::summarize_by_teacher(&records) }))
}

fn daily(
    store: &AttendanceStore,
    params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    let (as_of, days) = window_params(params)?;
    let records = store.load();
    Ok(json!({ "buckets": calc::daily_buckets(&records, as_of, days) }))
}

fn student(
    store: &AttendanceStore,
    params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    let student_id = required_str(params, "studentId")?;
    let since = required_date(params, "sinceDate")?;
    let to = required_date(params, "toDate")?;
    let records = store.load();
    let report = calc::student_summary(&records, &student_id, &since, &to);
    Ok(json!({ "subjects": report.subjects, "overall": report.overall }))
}

fn teacher_month(
    store: &AttendanceStore,
    params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    let teacher_id = required_str(params, "teacherId")?;
    let (year, month) = required_year_month(params)?;
    let records = store.get_by_teacher_and_month(&teacher_id, year, month);
    let report = calc::monthly_teacher_report(&records);
    Ok(json!({
        "teacherId": teacher_id,
        "year": year,
        "month": month,
        "scheduledDays": report.scheduled_days,
        "heldDays": report.held_days,
        "cancelledDays": report.cancelled_days,
        "students": report.students
    }))
}

fn attendance_health(
    store: &AttendanceStore,
    params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    let (as_of, days) = window_params(params)?;
    let records = store.load();
    let buckets = calc::daily_buckets(&records, as_of, days);
    let health = calc::attendance_health(&buckets);
    Ok(json!({ "buckets": buckets, "health": health }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let handled = |result: Result<serde_json::Value, HandlerErr>| match result {
        Ok(value) => ok(&req.id, value),
        Err(e) => e.response(&req.id),
    };

    match req.method.as_str() {
        "reports.bySubject" => Some(match store_ref(state, req) {
            Ok(store) => handled(by_subject(store, &req.params)),
            Err(resp) => resp,
        }),
        "reports.byTeacher" => Some(match store_ref(state, req) {
            Ok(store) => handled(by_teacher(store)),
            Err(resp) => resp,
        }),
        "reports.daily" => Some(match store_ref(state, req) {
            Ok(store) => handled(daily(store, &req.params)),
            Err(resp) => resp,
        }),
        "reports.student" => Some(match store_ref(state, req) {
            Ok(store) => handled(student(store, &req.params)),
            Err(resp) => resp,
        }),
        "reports.teacherMonth" => Some(match store_ref(state, req) {
            Ok(store) => handled(teacher_month(store, &req.params)),
            Err(resp) => resp,
        }),
        "reports.attendanceHealth" => Some(match store_ref(state, req) {
            Ok(store) => handled(attendance_health(store, &req.params)),
            Err(resp) => resp,
        }),
        _ => None,
    }
}
