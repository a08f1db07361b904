use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// The whole collection is serialized as one JSON array under this key.
pub const RECORDS_KEY: &str = "attendanceRecords";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SessionStatus {
    Held,
    Cancelled,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MarkStatus {
    Present,
    Absent,
    Late,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StudentEntry {
    pub student_id: String,
    pub status: MarkStatus,
    pub timestamp: String,
}

/// One teacher's session on one date. (teacherId, date) is the natural key;
/// at most one record per pair exists in the store.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AttendanceRecord {
    pub id: String,
    pub teacher_id: String,
    /// ISO calendar date, `YYYY-MM-DD`. Range scans compare lexically.
    pub date: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subject: Option<String>,
    /// None until the teacher sets the session outcome. Only Held sessions
    /// carry meaningful per-student entries.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<SessionStatus>,
    #[serde(default)]
    pub students: Vec<StudentEntry>,
    /// Bumped on every upsert; check-and-swap token for multi-writer clients.
    #[serde(default = "first_revision")]
    pub revision: i64,
    pub created_at: String,
    pub updated_at: String,
}

fn first_revision() -> i64 {
    1
}

/// Partial record accepted by `upsert`. Absent fields leave the stored
/// record untouched on update.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpsertSession {
    #[serde(default)]
    pub id: Option<String>,
    pub teacher_id: String,
    pub date: String,
    #[serde(default)]
    pub subject: Option<String>,
    #[serde(default)]
    pub status: Option<SessionStatus>,
    #[serde(default)]
    pub students: Option<Vec<StudentEntry>>,
}

#[derive(Debug)]
pub enum StoreError {
    NotFound(String),
    InvalidState(String),
    Conflict(String),
    Persist(anyhow::Error),
}

impl StoreError {
    pub fn code(&self) -> &'static str {
        match self {
            StoreError::NotFound(_) => "not_found",
            StoreError::InvalidState(_) => "invalid_state",
            StoreError::Conflict(_) => "conflict",
            StoreError::Persist(_) => "persist_write_failed",
        }
    }
}

impl fmt::Display for StoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StoreError::NotFound(m) => write!(f, "{}", m),
            StoreError::InvalidState(m) => write!(f, "{}", m),
            StoreError::Conflict(m) => write!(f, "{}", m),
            StoreError::Persist(e) => write!(f, "persist failed: {:?}", e),
        }
    }
}

/// Backend the store persists through. Production wires in SQLite; tests
/// substitute an in-memory map. The store never names a concrete backend.
pub trait KvPort {
    fn get(&self, key: &str) -> anyhow::Result<Option<String>>;
    fn set(&mut self, key: &str, value: &str) -> anyhow::Result<()>;
}

pub struct AttendanceStore {
    port: Box<dyn KvPort>,
}

impl AttendanceStore {
    pub fn new(port: Box<dyn KvPort>) -> Self {
        Self { port }
    }

    /// Read the full collection. Read failures never propagate: a missing or
    /// corrupt collection degrades to empty (logged), so every read path
    /// stays total. Write failures are a different matter, see `save`.
    pub fn load(&self) -> Vec<AttendanceRecord> {
        match self.port.get(RECORDS_KEY) {
            Ok(Some(raw)) => match serde_json::from_str(&raw) {
                Ok(records) => records,
                Err(e) => {
                    log::warn!("attendance collection is corrupt, treating as empty: {}", e);
                    Vec::new()
                }
            },
            Ok(None) => Vec::new(),
            Err(e) => {
                log::warn!("attendance collection read failed, treating as empty: {:?}", e);
                Vec::new()
            }
        }
    }

    fn save(&mut self, records: &[AttendanceRecord]) -> Result<(), StoreError> {
        let raw = serde_json::to_string(records)
            .map_err(|e| StoreError::Persist(anyhow::Error::new(e)))?;
        self.port
            .set(RECORDS_KEY, &raw)
            .map_err(StoreError::Persist)
    }

    /// Merge-upsert keyed by (teacherId, date).
    ///
    /// Update: present fields shallow-merge over a copy of the stored record;
    /// `createdAt` and absent fields are preserved, `revision` bumps,
    /// `updatedAt` refreshes. Create: id defaults to `a-{date}-{teacherId}`,
    /// both timestamps set to now. Net content is idempotent for identical
    /// input; only `updatedAt`/`revision` advance.
    ///
    /// `expected_revision` makes the call a check-and-swap: a mismatch with
    /// the stored revision fails with `conflict` and changes nothing.
    pub fn upsert(
        &mut self,
        partial: UpsertSession,
        expected_revision: Option<i64>,
    ) -> Result<AttendanceRecord, StoreError> {
        let mut records = self.load();
        let now = now_rfc3339();

        let pos = records
            .iter()
            .position(|r| r.teacher_id == partial.teacher_id && r.date == partial.date);

        let stored = match pos {
            Some(i) => {
                if let Some(expected) = expected_revision {
                    if expected != records[i].revision {
                        return Err(StoreError::Conflict(format!(
                            "revision mismatch for {} on {}: expected {}, stored {}",
                            partial.teacher_id, partial.date, expected, records[i].revision
                        )));
                    }
                }
                let mut merged = records[i].clone();
                if let Some(id) = partial.id {
                    merged.id = id;
                }
                if let Some(subject) = partial.subject {
                    merged.subject = Some(subject);
                }
                if let Some(status) = partial.status {
                    merged.status = Some(status);
                }
                if let Some(students) = partial.students {
                    merged.students = students;
                }
                merged.revision += 1;
                merged.updated_at = now;
                records[i] = merged.clone();
                merged
            }
            None => {
                if expected_revision.is_some() {
                    return Err(StoreError::Conflict(format!(
                        "no stored session for {} on {} to check revision against",
                        partial.teacher_id, partial.date
                    )));
                }
                let record = AttendanceRecord {
                    id: partial
                        .id
                        .unwrap_or_else(|| format!("a-{}-{}", partial.date, partial.teacher_id)),
                    teacher_id: partial.teacher_id,
                    date: partial.date,
                    subject: partial.subject,
                    status: partial.status,
                    students: partial.students.unwrap_or_default(),
                    revision: 1,
                    created_at: now.clone(),
                    updated_at: now,
                };
                records.push(record.clone());
                record
            }
        };

        self.save(&records)?;
        Ok(stored)
    }

    pub fn get_by_teacher_and_date(&self, teacher_id: &str, date: &str) -> Option<AttendanceRecord> {
        self.load()
            .into_iter()
            .find(|r| r.teacher_id == teacher_id && r.date == date)
    }

    /// Inclusive scan over [first day, last day] of the month. ISO dates sort
    /// lexically, so plain string comparison is chronological. Result keeps
    /// insertion order; callers wanting chronological order sort themselves.
    pub fn get_by_teacher_and_month(
        &self,
        teacher_id: &str,
        year: i32,
        month: u32,
    ) -> Vec<AttendanceRecord> {
        let (start, end) = month_bounds(year, month);
        self.load()
            .into_iter()
            .filter(|r| {
                r.teacher_id == teacher_id && r.date.as_str() >= start.as_str() && r.date <= end
            })
            .collect()
    }

    /// Update-or-append one student's entry on an existing Held session.
    pub fn mark_student(
        &mut self,
        teacher_id: &str,
        date: &str,
        student_id: &str,
        status: MarkStatus,
    ) -> Result<AttendanceRecord, StoreError> {
        let existing = self
            .get_by_teacher_and_date(teacher_id, date)
            .ok_or_else(|| {
                StoreError::NotFound(format!("no session for {} on {}", teacher_id, date))
            })?;
        if existing.status != Some(SessionStatus::Held) {
            return Err(StoreError::InvalidState(format!(
                "session for {} on {} is not held; set status to Held before marking students",
                teacher_id, date
            )));
        }

        let now = now_rfc3339();
        let mut students = existing.students;
        match students.iter_mut().find(|e| e.student_id == student_id) {
            Some(entry) => {
                entry.status = status;
                entry.timestamp = now;
            }
            None => students.push(StudentEntry {
                student_id: student_id.to_string(),
                status,
                timestamp: now,
            }),
        }

        self.upsert(
            UpsertSession {
                teacher_id: teacher_id.to_string(),
                date: date.to_string(),
                students: Some(students),
                ..Default::default()
            },
            None,
        )
    }

    /// Force status=Cancelled on every existing record for the teacher in the
    /// inclusive range. Never creates records for days with no record; callers
    /// must pre-create sessions for bulk-cancel to touch them.
    pub fn bulk_cancel(
        &mut self,
        teacher_id: &str,
        start_date: &str,
        end_date: &str,
    ) -> Result<bool, StoreError> {
        let mut records = self.load();
        let now = now_rfc3339();
        let mut changed = false;

        for r in records.iter_mut() {
            if r.teacher_id != teacher_id {
                continue;
            }
            if r.date.as_str() < start_date || r.date.as_str() > end_date {
                continue;
            }
            r.status = Some(SessionStatus::Cancelled);
            r.revision += 1;
            r.updated_at = now.clone();
            changed = true;
        }

        if changed {
            self.save(&records)?;
        }
        Ok(changed)
    }
}

pub fn days_in_month(year: i32, month: u32) -> u32 {
    let leap = (year % 4 == 0 && year % 100 != 0) || year % 400 == 0;
    match month {
        1 | 3 | 5 | 7 | 8 | 10 | 12 => 31,
        4 | 6 | 9 | 11 => 30,
        2 if leap => 29,
        2 => 28,
        _ => 30,
    }
}

pub fn month_bounds(year: i32, month: u32) -> (String, String) {
    let start = format!("{:04}-{:02}-01", year, month);
    let end = format!("{:04}-{:02}-{:02}", year, month, days_in_month(year, month));
    (start, end)
}

fn now_rfc3339() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    struct MemoryKv {
        map: HashMap<String, String>,
    }

    impl MemoryKv {
        fn new() -> Self {
            Self {
                map: HashMap::new(),
            }
        }
    }

    impl KvPort for MemoryKv {
        fn get(&self, key: &str) -> anyhow::Result<Option<String>> {
            Ok(self.map.get(key).cloned())
        }

        fn set(&mut self, key: &str, value: &str) -> anyhow::Result<()> {
            self.map.insert(key.to_string(), value.to_string());
            Ok(())
        }
    }

    struct BrokenKv {
        read_garbage: bool,
        fail_writes: bool,
    }

    impl KvPort for BrokenKv {
        fn get(&self, _key: &str) -> anyhow::Result<Option<String>> {
            if self.read_garbage {
                Ok(Some("not json".to_string()))
            } else {
                Err(anyhow::anyhow!("backend read failure"))
            }
        }

        fn set(&mut self, _key: &str, _value: &str) -> anyhow::Result<()> {
            if self.fail_writes {
                Err(anyhow::anyhow!("backend write failure"))
            } else {
                Ok(())
            }
        }
    }

    fn memory_store() -> AttendanceStore {
        AttendanceStore::new(Box::new(MemoryKv::new()))
    }

    fn held_session(teacher_id: &str, date: &str) -> UpsertSession {
        UpsertSession {
            teacher_id: teacher_id.to_string(),
            date: date.to_string(),
            status: Some(SessionStatus::Held),
            ..Default::default()
        }
    }

    #[test]
    fn upsert_assigns_deterministic_id_and_timestamps() {
        let mut store = memory_store();
        let rec = store
            .upsert(held_session("t1", "2024-03-04"), None)
            .expect("upsert");
        assert_eq!(rec.id, "a-2024-03-04-t1");
        assert_eq!(rec.revision, 1);
        assert_eq!(rec.created_at, rec.updated_at);
    }

    #[test]
    fn upsert_identical_content_is_idempotent_except_updated_at() {
        let mut store = memory_store();
        let first = store
            .upsert(held_session("t1", "2024-03-04"), None)
            .expect("first upsert");
        let second = store
            .upsert(held_session("t1", "2024-03-04"), None)
            .expect("second upsert");

        assert_eq!(second.id, first.id);
        assert_eq!(second.created_at, first.created_at);
        assert_eq!(second.status, first.status);
        assert_eq!(second.students, first.students);
        assert_eq!(second.revision, first.revision + 1);
        assert_eq!(store.load().len(), 1);
    }

    #[test]
    fn upsert_merges_without_clobbering_absent_fields() {
        let mut store = memory_store();
        store
            .upsert(held_session("t1", "2024-03-04"), None)
            .expect("create");
        let merged = store
            .upsert(
                UpsertSession {
                    teacher_id: "t1".to_string(),
                    date: "2024-03-04".to_string(),
                    subject: Some("Math".to_string()),
                    ..Default::default()
                },
                None,
            )
            .expect("merge");

        assert_eq!(merged.status, Some(SessionStatus::Held));
        assert_eq!(merged.subject.as_deref(), Some("Math"));
    }

    #[test]
    fn upsert_rejects_stale_revision() {
        let mut store = memory_store();
        let rec = store
            .upsert(held_session("t1", "2024-03-04"), None)
            .expect("create");
        store
            .upsert(held_session("t1", "2024-03-04"), None)
            .expect("bump");

        let err = store
            .upsert(held_session("t1", "2024-03-04"), Some(rec.revision))
            .expect_err("stale revision must fail");
        assert_eq!(err.code(), "conflict");

        // Matching revision goes through.
        let current = store
            .get_by_teacher_and_date("t1", "2024-03-04")
            .expect("record");
        store
            .upsert(held_session("t1", "2024-03-04"), Some(current.revision))
            .expect("fresh revision");
    }

    #[test]
    fn mark_student_requires_existing_held_session() {
        let mut store = memory_store();

        let err = store
            .mark_student("t1", "2024-03-04", "s1", MarkStatus::Present)
            .expect_err("no session yet");
        assert_eq!(err.code(), "not_found");

        store
            .upsert(
                UpsertSession {
                    teacher_id: "t1".to_string(),
                    date: "2024-03-04".to_string(),
                    status: Some(SessionStatus::Cancelled),
                    ..Default::default()
                },
                None,
            )
            .expect("create cancelled");
        let err = store
            .mark_student("t1", "2024-03-04", "s1", MarkStatus::Present)
            .expect_err("cancelled session");
        assert_eq!(err.code(), "invalid_state");
    }

    #[test]
    fn mark_student_updates_in_place_by_student_id() {
        let mut store = memory_store();
        store
            .upsert(held_session("t1", "2024-03-04"), None)
            .expect("create");

        store
            .mark_student("t1", "2024-03-04", "s1", MarkStatus::Absent)
            .expect("first mark");
        let rec = store
            .mark_student("t1", "2024-03-04", "s1", MarkStatus::Late)
            .expect("re-mark");

        assert_eq!(rec.students.len(), 1);
        assert_eq!(rec.students[0].status, MarkStatus::Late);

        let rec = store
            .mark_student("t1", "2024-03-04", "s2", MarkStatus::Present)
            .expect("second student");
        assert_eq!(rec.students.len(), 2);
    }

    #[test]
    fn month_scan_is_inclusive_and_teacher_scoped() {
        let mut store = memory_store();
        for date in ["2024-01-31", "2024-02-01", "2024-02-15", "2024-02-29", "2024-03-01"] {
            store.upsert(held_session("t1", date), None).expect("seed");
        }
        store
            .upsert(held_session("t2", "2024-02-10"), None)
            .expect("other teacher");

        let records = store.get_by_teacher_and_month("t1", 2024, 2);
        let dates: Vec<&str> = records.iter().map(|r| r.date.as_str()).collect();
        assert_eq!(dates, vec!["2024-02-01", "2024-02-15", "2024-02-29"]);
    }

    #[test]
    fn bulk_cancel_only_touches_existing_records_in_range() {
        let mut store = memory_store();
        for (date, status) in [
            ("2024-01-01", SessionStatus::Held),
            ("2024-01-02", SessionStatus::Cancelled),
            ("2024-01-03", SessionStatus::Held),
            ("2024-01-04", SessionStatus::Held),
            ("2024-01-05", SessionStatus::Cancelled),
        ] {
            store
                .upsert(
                    UpsertSession {
                        teacher_id: "t1".to_string(),
                        date: date.to_string(),
                        status: Some(status),
                        ..Default::default()
                    },
                    None,
                )
                .expect("seed");
        }

        let changed = store
            .bulk_cancel("t1", "2024-01-01", "2024-01-06")
            .expect("bulk cancel");
        assert!(changed);

        let records = store.get_by_teacher_and_month("t1", 2024, 1);
        assert_eq!(records.len(), 5);
        assert!(records
            .iter()
            .all(|r| r.status == Some(SessionStatus::Cancelled)));
        assert!(store.get_by_teacher_and_date("t1", "2024-01-06").is_none());

        let changed = store
            .bulk_cancel("t1", "2024-06-01", "2024-06-30")
            .expect("empty range");
        assert!(!changed);
    }

    #[test]
    fn corrupt_or_failing_reads_degrade_to_empty() {
        let garbage = AttendanceStore::new(Box::new(BrokenKv {
            read_garbage: true,
            fail_writes: false,
        }));
        assert!(garbage.load().is_empty());

        let failing = AttendanceStore::new(Box::new(BrokenKv {
            read_garbage: false,
            fail_writes: false,
        }));
        assert!(failing.load().is_empty());
    }

    #[test]
    fn write_failures_propagate() {
        let mut store = AttendanceStore::new(Box::new(BrokenKv {
            read_garbage: false,
            fail_writes: true,
        }));
        let err = store
            .upsert(held_session("t1", "2024-03-04"), None)
            .expect_err("write must fail");
        assert_eq!(err.code(), "persist_write_failed");
    }
}
