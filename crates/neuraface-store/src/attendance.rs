//! Daily attendance ledger: one row per (student, date), last write wins.

use crate::{constraint_violation, Store, StoreError};
use chrono::{Local, NaiveDate};
use neuraface_core::AttendanceLedger;
use rusqlite::{ffi, params};
use serde::Serialize;

pub const STATUS_PRESENT: &str = "Present";
pub const STATUS_ABSENT: &str = "Absent";

const DATE_FORMAT: &str = "%Y-%m-%d";

/// One student's attendance on a given date.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AttendanceRow {
    pub student_id: String,
    pub name: String,
    pub present: bool,
    pub status: String,
}

/// The local calendar day attendance is recorded against.
pub fn today() -> NaiveDate {
    Local::now().date_naive()
}

fn date_key(date: NaiveDate) -> String {
    date.format(DATE_FORMAT).to_string()
}

impl Store {
    /// Mark `student_id` present on `date`. Repeating the call is a no-op.
    pub fn record_attendance(&self, student_id: &str, date: NaiveDate) -> Result<(), StoreError> {
        let result = self.conn.execute(
            "INSERT OR REPLACE INTO attendance (student_id, attendance_date, is_present) VALUES (?1, ?2, TRUE)",
            params![student_id, date_key(date)],
        );

        match result {
            Ok(_) => {
                tracing::debug!(student_id, %date, "attendance upserted");
                Ok(())
            }
            Err(e) if constraint_violation(&e) == Some(ffi::SQLITE_CONSTRAINT_FOREIGNKEY) => {
                Err(StoreError::UnknownStudent(student_id.to_string()))
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Mark `student_id` present for the local calendar day.
    pub fn record_attendance_today(&self, student_id: &str) -> Result<(), StoreError> {
        self.record_attendance(student_id, today())
    }

    /// Every enrolled student with their status on `date`, ordered by name.
    ///
    /// Students without a row for `date` are reported absent.
    pub fn attendance_for_date(&self, date: NaiveDate) -> Result<Vec<AttendanceRow>, StoreError> {
        let mut stmt = self.conn.prepare(
            r#"
            SELECT s.student_id,
                   s.student_name,
                   COALESCE(a.is_present, 0),
                   CASE WHEN a.is_present THEN ?2 ELSE ?3 END
            FROM students s
            LEFT JOIN attendance a
              ON s.student_id = a.student_id AND a.attendance_date = ?1
            ORDER BY s.student_name, s.student_id
            "#,
        )?;

        let rows = stmt
            .query_map(params![date_key(date), STATUS_PRESENT, STATUS_ABSENT], |row| {
                Ok(AttendanceRow {
                    student_id: row.get(0)?,
                    name: row.get(1)?,
                    present: row.get(2)?,
                    status: row.get(3)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    /// [`attendance_for_date`](Self::attendance_for_date) for the local calendar day.
    pub fn attendance_today(&self) -> Result<Vec<AttendanceRow>, StoreError> {
        self.attendance_for_date(today())
    }
}

impl AttendanceLedger for Store {
    type Error = StoreError;

    fn mark_present(&mut self, student_id: &str) -> Result<(), StoreError> {
        self.record_attendance_today(student_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use neuraface_core::Embedding;

    fn store_with(students: &[(&str, &str)]) -> Store {
        let store = Store::open_in_memory().unwrap();
        for (id, name) in students {
            store
                .save_student(id, name, b"png", &Embedding::new(vec![1.0, 2.0]))
                .unwrap();
        }
        store
    }

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 9, d).unwrap()
    }

    fn row_count(store: &Store) -> i64 {
        store
            .conn
            .query_row("SELECT COUNT(*) FROM attendance", [], |r| r.get(0))
            .unwrap()
    }

    #[test]
    fn test_record_twice_is_idempotent() {
        let store = store_with(&[("s1", "Alice")]);
        store.record_attendance("s1", day(2)).unwrap();
        store.record_attendance("s1", day(2)).unwrap();

        assert_eq!(row_count(&store), 1);
        let (date, present): (String, bool) = store
            .conn
            .query_row("SELECT attendance_date, is_present FROM attendance", [], |r| {
                Ok((r.get(0)?, r.get(1)?))
            })
            .unwrap();
        assert_eq!(date, "2024-09-02");
        assert!(present);
    }

    #[test]
    fn test_separate_days_are_separate_rows() {
        let store = store_with(&[("s1", "Alice")]);
        store.record_attendance("s1", day(2)).unwrap();
        store.record_attendance("s1", day(3)).unwrap();
        assert_eq!(row_count(&store), 2);
    }

    #[test]
    fn test_unregistered_student_rejected() {
        let store = store_with(&[("s1", "Alice")]);
        let err = store.record_attendance("ghost", day(2)).unwrap_err();
        assert!(matches!(err, StoreError::UnknownStudent(ref id) if id == "ghost"));
        assert_eq!(row_count(&store), 0);
    }

    #[test]
    fn test_date_without_rows_reports_everyone_absent() {
        let store = store_with(&[("s2", "Bob"), ("s1", "Alice")]);
        store.record_attendance("s1", day(2)).unwrap();

        let rows = store.attendance_for_date(day(5)).unwrap();
        assert_eq!(rows.len(), 2);
        assert!(rows.iter().all(|r| !r.present && r.status == STATUS_ABSENT));
    }

    #[test]
    fn test_report_joins_and_orders_by_name() {
        let store = store_with(&[("s2", "Bob"), ("s1", "Alice"), ("s3", "Carol")]);
        store.record_attendance("s3", day(2)).unwrap();

        let rows = store.attendance_for_date(day(2)).unwrap();
        let summary: Vec<(&str, bool, &str)> = rows
            .iter()
            .map(|r| (r.name.as_str(), r.present, r.status.as_str()))
            .collect();
        assert_eq!(
            summary,
            vec![
                ("Alice", false, STATUS_ABSENT),
                ("Bob", false, STATUS_ABSENT),
                ("Carol", true, STATUS_PRESENT),
            ]
        );
    }

    #[test]
    fn test_today_helpers_use_local_date() {
        let store = store_with(&[("s1", "Alice")]);
        store.record_attendance_today("s1").unwrap();
        let rows = store.attendance_for_date(today()).unwrap();
        assert!(rows[0].present);
        assert!(store.attendance_today().unwrap()[0].present);
    }

    #[test]
    fn test_store_is_an_attendance_ledger() {
        let mut store = store_with(&[("s1", "Alice")]);
        AttendanceLedger::mark_present(&mut store, "s1").unwrap();
        AttendanceLedger::mark_present(&mut store, "s1").unwrap();
        assert!(store.attendance_today().unwrap()[0].present);
        assert_eq!(row_count(&store), 1);

        let err = AttendanceLedger::mark_present(&mut store, "ghost").unwrap_err();
        assert!(matches!(err, StoreError::UnknownStudent(_)));
    }
}
