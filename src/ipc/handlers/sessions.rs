use serde_json::json;

use super::{required_date, required_str, store_mut, store_ref, HandlerErr};
use crate::ipc::error::ok;
use crate::ipc::types::{AppState, Request};
use crate::store::{AttendanceStore, MarkStatus, UpsertSession};

fn parse_upsert(params: &serde_json::Value) -> Result<UpsertSession, HandlerErr> {
    let partial: UpsertSession = serde_json::from_value(params.clone())
        .map_err(|e| HandlerErr::bad_params(format!("invalid session: {}", e)))?;
    if partial.teacher_id.trim().is_empty() {
        return Err(HandlerErr::bad_params("teacherId must not be empty"));
    }
    required_date(params, "date")?;
    Ok(partial)
}

fn parse_mark_status(params: &serde_json::Value) -> Result<MarkStatus, HandlerErr> {
    let raw = params
        .get("status")
        .cloned()
        .ok_or_else(|| HandlerErr::bad_params("missing status"))?;
    serde_json::from_value(raw)
        .map_err(|_| HandlerErr::bad_params("status must be Present, Absent, or Late"))
}

fn upsert_session(
    store: &mut AttendanceStore,
    params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    let partial = parse_upsert(params)?;
    let expected_revision = match params.get("expectedRevision") {
        None => None,
        Some(v) if v.is_null() => None,
        Some(v) => Some(
            v.as_i64()
                .ok_or_else(|| HandlerErr::bad_params("expectedRevision must be an integer"))?,
        ),
    };
    let record = store.upsert(partial, expected_revision)?;
    Ok(json!({ "record": record }))
}

fn get_session(
    store: &AttendanceStore,
    params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    let teacher_id = required_str(params, "teacherId")?;
    let date = required_date(params, "date")?;
    let record = store.get_by_teacher_and_date(&teacher_id, &date);
    Ok(json!({ "record": record }))
}

fn list_month(
    store: &AttendanceStore,
    params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    let teacher_id = required_str(params, "teacherId")?;
    let (year, month) = super::required_year_month(params)?;
    let records = store.get_by_teacher_and_month(&teacher_id, year, month);
    Ok(json!({ "records": records }))
}

fn mark_student(
    store: &mut AttendanceStore,
    params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    let teacher_id = required_str(params, "teacherId")?;
    let date = required_date(params, "date")?;
    let student_id = required_str(params, "studentId")?;
    let status = parse_mark_status(params)?;
    let record = store.mark_student(&teacher_id, &date, &student_id, status)?;
    Ok(json!({ "record": record }))
}

fn bulk_cancel(
    store: &mut AttendanceStore,
    params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    let teacher_id = required_str(params, "teacherId")?;
    let start_date = required_date(params, "startDate")?;
    let end_date = required_date(params, "endDate")?;
    let changed = store.bulk_cancel(&teacher_id, &start_date, &end_date)?;
    Ok(json!({ "changed": changed }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "attendance.upsertSession" => Some(match store_mut(state, req) {
            Ok(store) => match upsert_session(store, &req.params) {
                Ok(result) => ok(&req.id, result),
                Err(e) => e.response(&req.id),
            },
            Err(resp) => resp,
        }),
        "attendance.getSession" => Some(match store_ref(state, req) {
            Ok(store) => match get_session(store, &req.params) {
                Ok(result) => ok(&req.id, result),
                Err(e) => e.response(&req.id),
            },
            Err(resp) => resp,
        }),
        "attendance.listMonth" => Some(match store_ref(state, req) {
            Ok(store) => match list_month(store, &req.params) {
                Ok(result) => ok(&req.id, result),
                Err(e) => e.response(&req.id),
            },
            Err(resp) => resp,
        }),
        "attendance.markStudent" => Some(match store_mut(state, req) {
            Ok(store) => match mark_student(store, &req.params) {
                Ok(result) => ok(&req.id, result),
                Err(e) => e.response(&req.id),
            },
            Err(resp) => resp,
        }),
        "attendance.bulkCancel" => Some(match store_mut(state, req) {
            Ok(store) => match bulk_cancel(store, &req.params) {
                Ok(result) => ok(&req.id, result),
                Err(e) => e.response(&req.id),
            },
            Err(resp) => resp,
        }),
        _ => None,
    }
}
