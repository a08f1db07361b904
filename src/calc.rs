use chrono::{Duration, NaiveDate};
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};

use crate::store::{AttendanceRecord, MarkStatus, SessionStatus};

const UNASSIGNED_SUBJECT: &str = "Unassigned";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatusCounts {
    pub present: i64,
    pub absent: i64,
    pub late: i64,
}

impl StatusCounts {
    fn add(&mut self, status: MarkStatus) {
        match status {
            MarkStatus::Present => self.present += 1,
            MarkStatus::Absent => self.absent += 1,
            MarkStatus::Late => self.late += 1,
        }
    }

    fn total(&self) -> i64 {
        self.present + self.absent + self.late
    }

    fn percentage(&self) -> i64 {
        attendance_percentage(self.present, self.late, self.total())
    }
}

/// Shared weighting rule for every rollup: late counts as attended but stays
/// a distinct bucket. An empty denominator is 0, never a division error.
pub fn attendance_percentage(present: i64, late: i64, total: i64) -> i64 {
    if total <= 0 {
        return 0;
    }
    (100.0 * (present + late) as f64 / total as f64).round() as i64
}

fn held(records: &[AttendanceRecord]) -> impl Iterator<Item = &AttendanceRecord> {
    records
        .iter()
        .filter(|r| r.status == Some(SessionStatus::Held))
}

fn subject_label(record: &AttendanceRecord) -> String {
    record
        .subject
        .clone()
        .unwrap_or_else(|| UNASSIGNED_SUBJECT.to_string())
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubjectSummary {
    pub subject: String,
    pub present: i64,
    pub absent: i64,
    pub late: i64,
    pub total: i64,
    pub percentage: i64,
}

/// Group Held records by subject, accumulating every student entry.
/// Cancelled and status-unset sessions contribute nothing.
pub fn summarize_by_subject(records: &[AttendanceRecord]) -> Vec<SubjectSummary> {
    let mut by_subject: BTreeMap<String, StatusCounts> = BTreeMap::new();
    for record in held(records) {
        let counts = by_subject.entry(subject_label(record)).or_default();
        for entry in &record.students {
            counts.add(entry.status);
        }
    }
    by_subject
        .into_iter()
        .map(|(subject, c)| SubjectSummary {
            subject,
            present: c.present,
            absent: c.absent,
            late: c.late,
            total: c.total(),
            percentage: c.percentage(),
        })
        .collect()
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TeacherSummary {
    pub teacher_id: String,
    pub subjects: Vec<String>,
    pub present: i64,
    pub absent: i64,
    pub late: i64,
    pub total: i64,
    pub percentage: i64,
}

pub fn summarize_by_teacher(records: &[AttendanceRecord]) -> Vec<TeacherSummary> {
    let mut by_teacher: BTreeMap<String, (BTreeSet<String>, StatusCounts)> = BTreeMap::new();
    for record in held(records) {
        let (subjects, counts) = by_teacher.entry(record.teacher_id.clone()).or_default();
        if let Some(subject) = &record.subject {
            subjects.insert(subject.clone());
        }
        for entry in &record.students {
            counts.add(entry.status);
        }
    }
    by_teacher
        .into_iter()
        .map(|(teacher_id, (subjects, c))| TeacherSummary {
            teacher_id,
            subjects: subjects.into_iter().collect(),
            present: c.present,
            absent: c.absent,
            late: c.late,
            total: c.total(),
            percentage: c.percentage(),
        })
        .collect()
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DailySummary {
    pub date: String,
    pub present: i64,
    pub absent: i64,
    pub late: i64,
    pub total: i64,
    pub percentage: i64,
}

/// One bucket per calendar date in the trailing `days`-long window ending at
/// `end`, chronological ascending. Dates with no Held records still get a
/// zero bucket so charts have a continuous axis.
pub fn daily_buckets(records: &[AttendanceRecord], end: NaiveDate, days: u32) -> Vec<DailySummary> {
    let mut counts_by_date: BTreeMap<String, StatusCounts> = BTreeMap::new();
    for record in held(records) {
        let counts = counts_by_date.entry(record.date.clone()).or_default();
        for entry in &record.students {
            counts.add(entry.status);
        }
    }

    let mut out = Vec::with_capacity(days as usize);
    for offset in (0..days as i64).rev() {
        let date = (end - Duration::days(offset)).format("%Y-%m-%d").to_string();
        let c = counts_by_date.get(&date).copied().unwrap_or_default();
        out.push(DailySummary {
            date,
            present: c.present,
            absent: c.absent,
            late: c.late,
            total: c.total(),
            percentage: c.percentage(),
        });
    }
    out
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StudentSubjectSummary {
    pub subject: String,
    pub present: i64,
    pub absent: i64,
    pub late: i64,
    pub total: i64,
    pub percentage: i64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StudentOverallSummary {
    pub present: i64,
    pub absent: i64,
    pub late: i64,
    pub total: i64,
    pub percentage: i64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StudentReport {
    pub subjects: Vec<StudentSubjectSummary>,
    pub overall: StudentOverallSummary,
}

/// Per-subject counts of one student's own entries across Held records in
/// [since, to] inclusive, plus an all-subjects rollup. Sessions where the
/// student has no entry are excluded entirely, never counted as absent.
pub fn student_summary(
    records: &[AttendanceRecord],
    student_id: &str,
    since: &str,
    to: &str,
) -> StudentReport {
    let mut by_subject: BTreeMap<String, StatusCounts> = BTreeMap::new();
    let mut overall = StatusCounts::default();

    for record in held(records) {
        if record.date.as_str() < since || record.date.as_str() > to {
            continue;
        }
        let Some(entry) = record.students.iter().find(|e| e.student_id == student_id) else {
            continue;
        };
        by_subject
            .entry(subject_label(record))
            .or_default()
            .add(entry.status);
        overall.add(entry.status);
    }

    StudentReport {
        subjects: by_subject
            .into_iter()
            .map(|(subject, c)| StudentSubjectSummary {
                subject,
                present: c.present,
                absent: c.absent,
                late: c.late,
                total: c.total(),
                percentage: c.percentage(),
            })
            .collect(),
        overall: StudentOverallSummary {
            present: overall.present,
            absent: overall.absent,
            late: overall.late,
            total: overall.total(),
            percentage: overall.percentage(),
        },
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MonthlyStudentRow {
    pub student_id: String,
    pub present: i64,
    pub absent: i64,
    pub late: i64,
    pub total: i64,
    pub percentage: i64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MonthlyTeacherReport {
    /// Every record found in the month counts as a scheduled day, whatever
    /// its status; "scheduled" here means "a record exists".
    pub scheduled_days: i64,
    pub held_days: i64,
    pub cancelled_days: i64,
    pub students: Vec<MonthlyStudentRow>,
}

/// Reduce one teacher's records for a single month. The caller supplies the
/// month scope (a `get_by_teacher_and_month` result).
pub fn monthly_teacher_report(month_records: &[AttendanceRecord]) -> MonthlyTeacherReport {
    let scheduled_days = month_records.len() as i64;
    let held_days = held(month_records).count() as i64;
    let cancelled_days = month_records
        .iter()
        .filter(|r| r.status == Some(SessionStatus::Cancelled))
        .count() as i64;

    let mut by_student: BTreeMap<String, StatusCounts> = BTreeMap::new();
    for record in held(month_records) {
        for entry in &record.students {
            by_student
                .entry(entry.student_id.clone())
                .or_default()
                .add(entry.status);
        }
    }

    MonthlyTeacherReport {
        scheduled_days,
        held_days,
        cancelled_days,
        students: by_student
            .into_iter()
            .map(|(student_id, c)| MonthlyStudentRow {
                student_id,
                present: c.present,
                absent: c.absent,
                late: c.late,
                total: c.total(),
                percentage: c.percentage(),
            })
            .collect(),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum DayClass {
    Present,
    Absent,
    Late,
}

/// Majority-rule day health. This classifies the day itself and is a separate
/// rule from the entry-percentage above; the two must not be conflated.
/// Days with no entries are unclassified.
pub fn classify_day(bucket: &DailySummary) -> Option<DayClass> {
    if bucket.total == 0 {
        return None;
    }
    if bucket.absent * 2 > bucket.total {
        return Some(DayClass::Absent);
    }
    if bucket.late >= 1 && (bucket.present + bucket.late) * 2 >= bucket.total {
        return Some(DayClass::Late);
    }
    Some(DayClass::Present)
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AttendanceHealth {
    pub present_days: i64,
    pub absent_days: i64,
    pub late_days: i64,
    pub classified_days: i64,
}

pub fn attendance_health(buckets: &[DailySummary]) -> AttendanceHealth {
    let mut health = AttendanceHealth {
        present_days: 0,
        absent_days: 0,
        late_days: 0,
        classified_days: 0,
    };
    for bucket in buckets {
        match classify_day(bucket) {
            Some(DayClass::Present) => health.present_days += 1,
            Some(DayClass::Absent) => health.absent_days += 1,
            Some(DayClass::Late) => health.late_days += 1,
            None => continue,
        }
        health.classified_days += 1;
    }
    health
}
