pub mod core;
pub mod reports;
pub mod schedule;
pub mod sessions;

use chrono::NaiveDate;

use crate::ipc::error::err;
use crate::ipc::types::{AppState, Request};
use crate::store::{AttendanceStore, StoreError};

pub(crate) struct HandlerErr {
    pub code: &'static str,
    pub message: String,
    pub details: Option<serde_json::Value>,
}

impl HandlerErr {
    pub fn bad_params(message: impl Into<String>) -> Self {
        HandlerErr {
            code: "bad_params",
            message: message.into(),
            details: None,
        }
    }

    pub fn response(self, id: &str) -> serde_json::Value {
        err(id, self.code, self.message, self.details)
    }
}

impl From<StoreError> for HandlerErr {
    fn from(e: StoreError) -> Self {
        HandlerErr {
            code: e.code(),
            message: e.to_string(),
            details: None,
        }
    }
}

pub(crate) fn required_str(params: &serde_json::Value, key: &str) -> Result<String, HandlerErr> {
    params
        .get(key)
        .and_then(|v| v.as_str())
        .map(|s| s.to_string())
        .ok_or_else(|| HandlerErr::bad_params(format!("missing {}", key)))
}

pub(crate) fn required_date(params: &serde_json::Value, key: &str) -> Result<String, HandlerErr> {
    let raw = required_str(params, key)?;
    parse_iso_date(&raw, key)?;
    Ok(raw)
}

pub(crate) fn parse_iso_date(raw: &str, key: &str) -> Result<NaiveDate, HandlerErr> {
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .map_err(|_| HandlerErr::bad_params(format!("{} must be a YYYY-MM-DD date", key)))
}

pub(crate) fn required_year_month(params: &serde_json::Value) -> Result<(i32, u32), HandlerErr> {
    let year = params
        .get("year")
        .and_then(|v| v.as_i64())
        .ok_or_else(|| HandlerErr::bad_params("missing year"))?;
    if !(1000..=9999).contains(&year) {
        return Err(HandlerErr::bad_params("year must be a 4-digit number"));
    }
    let month = params
        .get("month")
        .and_then(|v| v.as_u64())
        .ok_or_else(|| HandlerErr::bad_params("missing month"))?;
    if !(1..=12).contains(&month) {
        return Err(HandlerErr::bad_params("month must be between 1 and 12"));
    }
    Ok((year as i32, month as u32))
}

pub(crate) fn store_ref<'a>(
    state: &'a AppState,
    req: &Request,
) -> Result<&'a AttendanceStore, serde_json::Value> {
    state
        .store
        .as_ref()
        .ok_or_else(|| err(&req.id, "no_workspace", "select a workspace first", None))
}

pub(crate) fn store_mut<'a>(
    state: &'a mut AppState,
    req: &Request,
) -> Result<&'a mut AttendanceStore, serde_json::Value> {
    match state.store.as_mut() {
        Some(store) => Ok(store),
        None => Err(err(&req.id, "no_workspace", "select a workspace first", None)),
    }
}
