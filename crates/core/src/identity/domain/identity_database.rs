use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::identity::domain::embedding::{blend_centroid, cosine_similarity, l2_norm};
use crate::identity::domain::match_strategy::MatchStrategy;

/// Tolerance on `|centroid| - 1` accepted when loading a database.
const UNIT_NORM_TOLERANCE: f64 = 1e-3;

#[derive(Error, Debug, PartialEq)]
pub enum IdentityError {
    #[error("embedding has {found} dimensions, database uses {expected}")]
    DimensionMismatch { expected: usize, found: usize },
    #[error("identity {0} already exists; choose a different id offset")]
    IdCollision(String),
    #[error("identity {id} has a centroid of norm {norm:.4}, expected 1")]
    NotUnitNorm { id: String, norm: f64 },
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct IdentityRecord {
    pub id: String,
    pub centroid: Vec<f32>,
}

/// Outcome of matching one video descriptor against the database.
#[derive(Clone, Debug, PartialEq)]
pub enum Assignment {
    Matched {
        id: String,
        position: usize,
        similarity: f64,
        centroid: Vec<f32>,
    },
    Created {
        id: String,
        centroid: Vec<f32>,
    },
}

impl Assignment {
    pub fn id(&self) -> &str {
        match self {
            Assignment::Matched { id, .. } | Assignment::Created { id, .. } => id,
        }
    }

    pub fn centroid(&self) -> &[f32] {
        match self {
            Assignment::Matched { centroid, .. } | Assignment::Created { centroid, .. } => {
                centroid
            }
        }
    }

    pub fn is_new(&self) -> bool {
        matches!(self, Assignment::Created { .. })
    }
}

/// Ordered identity id → unit-norm centroid mapping.
///
/// Insertion order is part of the semantics: first-match assignment scans
/// identities in the order they were created. Identities are never removed.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct IdentityDatabase {
    records: Vec<IdentityRecord>,
}

impl IdentityDatabase {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a database from persisted records, checking ids are unique,
    /// dimensions agree and centroids are unit length.
    pub fn from_records(records: Vec<IdentityRecord>) -> Result<Self, IdentityError> {
        let mut seen = HashSet::new();
        let expected = records.first().map(|r| r.centroid.len());
        for record in &records {
            if !seen.insert(record.id.as_str()) {
                return Err(IdentityError::IdCollision(record.id.clone()));
            }
            if let Some(expected) = expected {
                if record.centroid.len() != expected {
                    return Err(IdentityError::DimensionMismatch {
                        expected,
                        found: record.centroid.len(),
                    });
                }
            }
            let norm = l2_norm(&record.centroid);
            if (norm - 1.0).abs() > UNIT_NORM_TOLERANCE {
                return Err(IdentityError::NotUnitNorm {
                    id: record.id.clone(),
                    norm,
                });
            }
        }
        Ok(Self { records })
    }

    pub fn records(&self) -> &[IdentityRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn get(&self, id: &str) -> Option<&IdentityRecord> {
        self.records.iter().find(|r| r.id == id)
    }

    /// Embedding dimension, once the first identity exists.
    pub fn dimension(&self) -> Option<usize> {
        self.records.first().map(|r| r.centroid.len())
    }

    /// Id the next created identity receives: `id_{len + offset:06}`.
    pub fn next_id(&self, offset: usize) -> String {
        format!("id_{:06}", self.records.len() + offset)
    }

    /// Decides where `descriptor` belongs without changing the database.
    pub fn assign(
        &self,
        descriptor: &[f32],
        threshold: f64,
        offset: usize,
        strategy: MatchStrategy,
    ) -> Result<Assignment, IdentityError> {
        if let Some(expected) = self.dimension() {
            if descriptor.len() != expected {
                return Err(IdentityError::DimensionMismatch {
                    expected,
                    found: descriptor.len(),
                });
            }
        }

        let similarities = self
            .records
            .iter()
            .map(|r| cosine_similarity(&r.centroid, descriptor));

        if let Some((position, similarity)) = strategy.select(similarities, threshold) {
            let record = &self.records[position];
            return Ok(Assignment::Matched {
                id: record.id.clone(),
                position,
                similarity,
                centroid: blend_centroid(&record.centroid, descriptor),
            });
        }

        let id = self.next_id(offset);
        if self.get(&id).is_some() {
            return Err(IdentityError::IdCollision(id));
        }
        Ok(Assignment::Created {
            id,
            centroid: descriptor.to_vec(),
        })
    }

    /// Applies an assignment produced by [`assign`](Self::assign) on this
    /// same database state.
    pub fn apply(&mut self, assignment: &Assignment) {
        match assignment {
            Assignment::Matched {
                position, centroid, ..
            } => self.records[*position].centroid = centroid.clone(),
            Assignment::Created { id, centroid } => self.records.push(IdentityRecord {
                id: id.clone(),
                centroid: centroid.clone(),
            }),
        }
    }

    /// Copy of the database with `assignment` applied, for staging a commit.
    pub fn with_assignment(&self, assignment: &Assignment) -> Self {
        let mut staged = self.clone();
        staged.apply(assignment);
        staged
    }

    pub fn match_or_create(
        &mut self,
        descriptor: &[f32],
        threshold: f64,
        offset: usize,
        strategy: MatchStrategy,
    ) -> Result<Assignment, IdentityError> {
        let assignment = self.assign(descriptor, threshold, offset, strategy)?;
        self.apply(&assignment);
        Ok(assignment)
    }
}
