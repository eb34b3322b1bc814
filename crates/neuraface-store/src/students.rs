//! Enrolled students and their reference embeddings.

use crate::{constraint_violation, Store, StoreError};
use neuraface_core::{Embedding, EmbeddingIndex};
use rusqlite::{ffi, params, OptionalExtension};
use serde::Serialize;

/// A student without the heavy image/embedding columns.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StudentSummary {
    pub student_id: String,
    pub name: String,
}

impl Store {
    /// Register a new student. An existing `student_id` is never overwritten.
    pub fn save_student(
        &self,
        student_id: &str,
        name: &str,
        image_png: &[u8],
        embedding: &Embedding,
    ) -> Result<(), StoreError> {
        if student_id.trim().is_empty() {
            return Err(StoreError::MissingField("student id"));
        }
        if name.trim().is_empty() {
            return Err(StoreError::MissingField("student name"));
        }
        self.check_dimension(student_id, embedding)?;

        let result = self.conn.execute(
            "INSERT INTO students (student_id, student_name, image, embedding) VALUES (?1, ?2, ?3, ?4)",
            params![student_id, name, image_png, embedding.to_le_bytes()],
        );

        match result {
            Ok(_) => {
                tracing::info!(student_id, name, dimension = embedding.dimension(), "student registered");
                Ok(())
            }
            Err(e)
                if matches!(
                    constraint_violation(&e),
                    Some(ffi::SQLITE_CONSTRAINT_PRIMARYKEY) | Some(ffi::SQLITE_CONSTRAINT_UNIQUE)
                ) =>
            {
                tracing::warn!(student_id, "registration rejected: id already exists");
                Err(StoreError::DuplicateKey(student_id.to_string()))
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Load every student's embedding into a fresh index, in insertion order.
    ///
    /// An empty table yields an empty index; only real failures are errors.
    pub fn load_all_students(&self) -> Result<EmbeddingIndex, StoreError> {
        let mut stmt = self
            .conn
            .prepare("SELECT student_id, student_name, embedding FROM students ORDER BY rowid")?;
        let rows = stmt.query_map([], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, Vec<u8>>(2)?,
            ))
        })?;

        let mut entries = Vec::new();
        for row in rows {
            let (student_id, name, blob) = row?;
            let embedding = Embedding::from_le_bytes(&blob).map_err(|e| StoreError::InvalidEmbedding {
                student_id: student_id.clone(),
                reason: e.to_string(),
            })?;
            entries.push((student_id, name, embedding));
        }

        let index = EmbeddingIndex::from_rows(entries)?;
        tracing::debug!(students = index.len(), dimension = index.dimension(), "loaded embedding index");
        Ok(index)
    }

    /// Every student, ordered by name.
    pub fn students(&self) -> Result<Vec<StudentSummary>, StoreError> {
        let mut stmt = self
            .conn
            .prepare("SELECT student_id, student_name FROM students ORDER BY student_name, student_id")?;
        let rows = stmt
            .query_map([], |row| {
                Ok(StudentSummary {
                    student_id: row.get(0)?,
                    name: row.get(1)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    /// The PNG reference image captured at registration.
    pub fn student_image(&self, student_id: &str) -> Result<Vec<u8>, StoreError> {
        self.conn
            .query_row(
                "SELECT image FROM students WHERE student_id = ?1",
                params![student_id],
                |row| row.get::<_, Vec<u8>>(0),
            )
            .optional()?
            .ok_or_else(|| StoreError::UnknownStudent(student_id.to_string()))
    }

    /// New embeddings must match the dimension already stored.
    fn check_dimension(&self, student_id: &str, embedding: &Embedding) -> Result<(), StoreError> {
        if embedding.dimension() == 0 {
            return Err(StoreError::InvalidEmbedding {
                student_id: student_id.to_string(),
                reason: "embedding is empty".into(),
            });
        }

        let existing: Option<i64> = self
            .conn
            .query_row("SELECT length(embedding) FROM students LIMIT 1", [], |row| row.get(0))
            .optional()?;

        match existing {
            Some(bytes) if bytes != (embedding.dimension() * 4) as i64 => Err(StoreError::InvalidEmbedding {
                student_id: student_id.to_string(),
                reason: format!(
                    "{}-dim embedding, enrolled students are {}-dim",
                    embedding.dimension(),
                    bytes / 4
                ),
            }),
            _ => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn emb(values: &[f32]) -> Embedding {
        Embedding::new(values.to_vec())
    }

    #[test]
    fn test_save_and_load_roundtrip_in_order() {
        let store = Store::open_in_memory().unwrap();
        store.save_student("s2", "Bob", b"png-b", &emb(&[0.0, 1.0])).unwrap();
        store.save_student("s1", "Alice", b"png-a", &emb(&[1.0, 0.0])).unwrap();

        let index = store.load_all_students().unwrap();
        assert_eq!(index.ids(), &["s2".to_string(), "s1".to_string()]);
        assert_eq!(index.names(), &["Bob".to_string(), "Alice".to_string()]);
        let (_, _, row) = index.row(1).unwrap();
        assert_eq!(row.to_vec(), vec![1.0, 0.0]);
    }

    #[test]
    fn test_embedding_blob_is_raw_le_f32() {
        let store = Store::open_in_memory().unwrap();
        store.save_student("s1", "Alice", b"png", &emb(&[1.5, -2.0])).unwrap();
        let blob: Vec<u8> = store
            .conn
            .query_row("SELECT embedding FROM students WHERE student_id = 's1'", [], |r| r.get(0))
            .unwrap();
        let mut expected = 1.5f32.to_le_bytes().to_vec();
        expected.extend_from_slice(&(-2.0f32).to_le_bytes());
        assert_eq!(blob, expected);
    }

    #[test]
    fn test_empty_table_loads_empty_index() {
        let store = Store::open_in_memory().unwrap();
        assert!(store.load_all_students().unwrap().is_empty());
    }

    #[test]
    fn test_duplicate_id_rejected_and_original_kept() {
        let store = Store::open_in_memory().unwrap();
        store.save_student("s1", "Alice", b"png-a", &emb(&[1.0, 0.0])).unwrap();

        let err = store.save_student("s1", "Mallory", b"png-m", &emb(&[0.0, 1.0])).unwrap_err();
        assert!(matches!(err, StoreError::DuplicateKey(ref id) if id == "s1"));

        let index = store.load_all_students().unwrap();
        assert_eq!(index.len(), 1);
        assert_eq!(index.names(), &["Alice".to_string()]);
        assert_eq!(store.student_image("s1").unwrap(), b"png-a".to_vec());
    }

    #[test]
    fn test_missing_fields_rejected() {
        let store = Store::open_in_memory().unwrap();
        assert!(matches!(
            store.save_student("  ", "Alice", b"png", &emb(&[1.0])),
            Err(StoreError::MissingField(_))
        ));
        assert!(matches!(
            store.save_student("s1", "", b"png", &emb(&[1.0])),
            Err(StoreError::MissingField(_))
        ));
    }

    #[test]
    fn test_dimension_must_match_enrolled() {
        let store = Store::open_in_memory().unwrap();
        store.save_student("s1", "Alice", b"png", &emb(&[1.0, 0.0])).unwrap();
        let err = store.save_student("s2", "Bob", b"png", &emb(&[1.0, 0.0, 0.0])).unwrap_err();
        assert!(matches!(err, StoreError::InvalidEmbedding { .. }));
        assert!(matches!(
            store.save_student("s3", "Carol", b"png", &emb(&[])),
            Err(StoreError::InvalidEmbedding { .. })
        ));
    }

    #[test]
    fn test_corrupt_blob_is_reported() {
        let store = Store::open_in_memory().unwrap();
        store
            .conn
            .execute(
                "INSERT INTO students VALUES ('bad', 'Broken', x'00', x'000000')",
                [],
            )
            .unwrap();
        let err = store.load_all_students().unwrap_err();
        assert!(matches!(err, StoreError::InvalidEmbedding { ref student_id, .. } if student_id == "bad"));
    }

    #[test]
    fn test_students_sorted_by_name_and_image_lookup() {
        let store = Store::open_in_memory().unwrap();
        store.save_student("s2", "Zoe", b"z", &emb(&[1.0])).unwrap();
        store.save_student("s1", "Adam", b"a", &emb(&[2.0])).unwrap();

        let names: Vec<String> = store.students().unwrap().into_iter().map(|s| s.name).collect();
        assert_eq!(names, vec!["Adam", "Zoe"]);
        assert!(matches!(store.student_image("nobody"), Err(StoreError::UnknownStudent(_))));
    }
}
