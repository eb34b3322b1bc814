/// Table definitions, byte-compatible with databases created by earlier releases.
pub(crate) const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS students (
    student_id TEXT PRIMARY KEY,
    student_name TEXT NOT NULL,
    image BLOB NOT NULL,
    embedding BLOB NOT NULL
);

CREATE TABLE IF NOT EXISTS attendance (
    student_id TEXT REFERENCES students(student_id),
    attendance_date TEXT DEFAULT (DATE('now')),
    is_present BOOLEAN DEFAULT FALSE,
    PRIMARY KEY (student_id, attendance_date)
);
"#;
