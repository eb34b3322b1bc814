//! In-memory embedding index: every enrolled student as one matrix row.
//!
//! Built once per recognition session and never mutated afterwards; a
//! reload constructs a new index.

use crate::types::Embedding;
use ndarray::{Array2, ArrayView1};
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum IndexError {
    #[error("student {student_id} has a {actual}-dim embedding, index is {expected}-dim")]
    DimensionMismatch {
        student_id: String,
        expected: usize,
        actual: usize,
    },
}

/// Row `i` of `embeddings` belongs to `ids[i]` / `names[i]`.
#[derive(Debug, Clone)]
pub struct EmbeddingIndex {
    ids: Vec<String>,
    names: Vec<String>,
    embeddings: Array2<f32>,
}

impl EmbeddingIndex {
    /// An index with no students.
    pub fn empty() -> Self {
        Self {
            ids: Vec::new(),
            names: Vec::new(),
            embeddings: Array2::zeros((0, 0)),
        }
    }

    /// Build from `(student_id, name, embedding)` rows, preserving order.
    pub fn from_rows<I>(rows: I) -> Result<Self, IndexError>
    where
        I: IntoIterator<Item = (String, String, Embedding)>,
    {
        let mut ids = Vec::new();
        let mut names = Vec::new();
        let mut flat = Vec::new();
        let mut dim: Option<usize> = None;

        for (id, name, embedding) in rows {
            let actual = embedding.dimension();
            match dim {
                None => dim = Some(actual),
                Some(expected) if expected != actual => {
                    return Err(IndexError::DimensionMismatch {
                        student_id: id,
                        expected,
                        actual,
                    });
                }
                Some(_) => {}
            }
            ids.push(id);
            names.push(name);
            flat.extend(embedding.values);
        }

        let Some(dim) = dim else {
            return Ok(Self::empty());
        };

        let embeddings = Array2::from_shape_vec((ids.len(), dim), flat)
            .map_err(|_| IndexError::DimensionMismatch {
                student_id: ids.last().cloned().unwrap_or_default(),
                expected: dim,
                actual: 0,
            })?;

        Ok(Self {
            ids,
            names,
            embeddings,
        })
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    /// Embedding dimension, 0 for an empty index.
    pub fn dimension(&self) -> usize {
        self.embeddings.ncols()
    }

    pub fn ids(&self) -> &[String] {
        &self.ids
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }

    /// `(student_id, name, embedding row)` for row `i`.
    pub fn row(&self, i: usize) -> Option<(&str, &str, ArrayView1<'_, f32>)> {
        if i >= self.len() {
            return None;
        }
        Some((&self.ids[i], &self.names[i], self.embeddings.row(i)))
    }

    /// Rows in index order.
    pub fn rows(&self) -> impl Iterator<Item = (&str, &str, ArrayView1<'_, f32>)> + '_ {
        self.ids
            .iter()
            .zip(&self.names)
            .zip(self.embeddings.rows())
            .map(|((id, name), row)| (id.as_str(), name.as_str(), row))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(id: &str, name: &str, values: &[f32]) -> (String, String, Embedding) {
        (id.into(), name.into(), Embedding::new(values.to_vec()))
    }

    #[test]
    fn test_from_rows_keeps_order() {
        let index = EmbeddingIndex::from_rows(vec![
            row("s1", "Alice", &[1.0, 0.0]),
            row("s2", "Bob", &[0.0, 1.0]),
        ])
        .unwrap();

        assert_eq!(index.len(), 2);
        assert_eq!(index.dimension(), 2);
        let (id, name, emb) = index.row(1).unwrap();
        assert_eq!((id, name), ("s2", "Bob"));
        assert_eq!(emb.to_vec(), vec![0.0, 1.0]);
        let ids: Vec<&str> = index.rows().map(|(id, _, _)| id).collect();
        assert_eq!(ids, vec!["s1", "s2"]);
    }

    #[test]
    fn test_empty() {
        let index = EmbeddingIndex::from_rows(Vec::new()).unwrap();
        assert!(index.is_empty());
        assert_eq!(index.dimension(), 0);
        assert!(index.row(0).is_none());
    }

    #[test]
    fn test_rejects_mixed_dimensions() {
        let err = EmbeddingIndex::from_rows(vec![
            row("s1", "Alice", &[1.0, 0.0]),
            row("s2", "Bob", &[0.0, 1.0, 2.0]),
        ])
        .unwrap_err();
        assert_eq!(
            err,
            IndexError::DimensionMismatch { student_id: "s2".into(), expected: 2, actual: 3 }
        );
    }
}
