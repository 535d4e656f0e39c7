//! Permit store.
//!
//! Permits live in an append-only [`Ledger`] indexed by permit ID, by QR token
//! and by student ID. The ledger sits behind a single `RwLock`: readers run
//! concurrently, and a batch is checked and appended under one write guard so
//! no reader ever sees part of a batch.
//!
//! When opened with a snapshot path, every mutation is also written to disk
//! before the write guard is released. A failed write rolls the in-memory
//! mutation back.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use crate::err::Error;
use crate::io::{read_snapshot, write_snapshot};
use crate::models::ExamPermit;

#[derive(Debug, Default)]
pub struct Ledger {
    permits: Vec<ExamPermit>,
    by_id: HashMap<String, usize>,
    by_token: HashMap<String, usize>,
    by_student: HashMap<String, Vec<usize>>,
}

impl Ledger {
    fn from_permits(permits: Vec<ExamPermit>) -> Result<Self, Error> {
        let mut ledger = Ledger::default();
        ledger.check_batch(&permits)?;
        for permit in permits {
            ledger.push(permit);
        }
        Ok(ledger)
    }

    pub fn len(&self) -> usize {
        self.permits.len()
    }

    pub fn is_empty(&self) -> bool {
        self.permits.is_empty()
    }

    pub fn get(&self, permit_id: &str) -> Option<&ExamPermit> {
        self.by_id.get(permit_id).map(|&idx| &self.permits[idx])
    }

    pub fn find_by_token(&self, token: &str) -> Option<&ExamPermit> {
        self.by_token.get(token).map(|&idx| &self.permits[idx])
    }

    pub fn find_by_student<'a>(
        &'a self,
        student_id: &str,
    ) -> impl Iterator<Item = &'a ExamPermit> {
        self.by_student
            .get(student_id)
            .into_iter()
            .flatten()
            .map(move |&idx| &self.permits[idx])
    }

    /// Whether any permit, valid or revoked, exists for the pair.
    pub fn has_permit(&self, student_id: &str, course_id: &str) -> bool {
        self.find_by_student(student_id)
            .any(|permit| permit.course_id == course_id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &ExamPermit> {
        self.permits.iter()
    }

    /// Rejects a batch whose IDs or tokens collide with each other or with
    /// anything already stored.
    fn check_batch(&self, batch: &[ExamPermit]) -> Result<(), Error> {
        let mut ids = std::collections::HashSet::new();
        let mut tokens = std::collections::HashSet::new();
        for permit in batch {
            if self.by_token.contains_key(&permit.qr_code_data)
                || !tokens.insert(permit.qr_code_data.as_str())
            {
                return Err(Error::DuplicateToken {
                    message: format!("QR token of permit `{}` is already in use", permit.id),
                });
            }
            if self.by_id.contains_key(&permit.id) || !ids.insert(permit.id.as_str()) {
                return Err(Error::InternalError {
                    kind: "DuplicatePermitId",
                    message: format!("Permit id `{}` is already in use", permit.id),
                });
            }
        }
        Ok(())
    }

    fn push(&mut self, permit: ExamPermit) {
        let idx = self.permits.len();
        self.by_id.insert(permit.id.clone(), idx);
        self.by_token.insert(permit.qr_code_data.clone(), idx);
        self.by_student
            .entry(permit.student_id.clone())
            .or_default()
            .push(idx);
        self.permits.push(permit);
    }

    /// Drops every permit at position `len` or later.
    fn truncate(&mut self, len: usize) {
        while self.permits.len() > len {
            let permit = match self.permits.pop() {
                Some(permit) => permit,
                None => break,
            };
            self.by_id.remove(&permit.id);
            self.by_token.remove(&permit.qr_code_data);
            if let Some(indexes) = self.by_student.get_mut(&permit.student_id) {
                indexes.retain(|&idx| idx < len);
                if indexes.is_empty() {
                    self.by_student.remove(&permit.student_id);
                }
            }
        }
    }
}

#[derive(Serialize)]
struct SnapshotRef<'a> {
    permits: &'a [ExamPermit],
}

#[derive(Deserialize)]
struct Snapshot {
    permits: Vec<ExamPermit>,
}

#[derive(Debug, Default)]
pub struct PermitStore {
    ledger: RwLock<Ledger>,
    snapshot: Option<PathBuf>,
}

impl PermitStore {
    /// Memory-only store, empty until the process writes to it.
    pub fn new() -> Self {
        Self::default()
    }

    /// Store persisted at `path`, seeded from whatever was last written there.
    pub async fn open(path: impl Into<PathBuf>) -> Result<Self, Error> {
        let path = path.into();
        let ledger = match read_snapshot::<Snapshot>(&path).await? {
            Some(snapshot) => Ledger::from_permits(snapshot.permits)?,
            None => Ledger::default(),
        };
        log::info!(
            "Loaded {} permits from snapshot {}",
            ledger.len(),
            path.display()
        );
        Ok(Self {
            ledger: RwLock::new(ledger),
            snapshot: Some(path),
        })
    }

    pub fn snapshot_path(&self) -> Option<&Path> {
        self.snapshot.as_deref()
    }

    pub async fn insert(&self, permit: ExamPermit) -> Result<(), Error> {
        self.append_batch(move |_| Ok(vec![permit])).await?;
        Ok(())
    }

    /// Builds a batch against the current ledger and appends it, all under
    /// one write guard. Either every permit `build` returns becomes visible
    /// or none does.
    pub async fn append_batch<F>(&self, build: F) -> Result<Vec<ExamPermit>, Error>
    where
        F: FnOnce(&Ledger) -> Result<Vec<ExamPermit>, Error>,
    {
        let mut ledger = self.ledger.write().await;
        let batch = build(&*ledger)?;
        ledger.check_batch(&batch)?;

        let mark = ledger.len();
        for permit in &batch {
            ledger.push(permit.clone());
        }
        if let Err(err) = self.persist(&*ledger).await {
            ledger.truncate(mark);
            return Err(err);
        }
        Ok(batch)
    }

    pub async fn find_by_token(&self, token: &str) -> Option<ExamPermit> {
        self.ledger.read().await.find_by_token(token).cloned()
    }

    pub async fn find_by_id(&self, permit_id: &str) -> Option<ExamPermit> {
        self.ledger.read().await.get(permit_id).cloned()
    }

    /// Insertion order; empty when the student holds no permits.
    pub async fn find_by_student(&self, student_id: &str) -> Vec<ExamPermit> {
        self.ledger
            .read()
            .await
            .find_by_student(student_id)
            .cloned()
            .collect()
    }

    pub async fn all(&self) -> Vec<ExamPermit> {
        self.ledger.read().await.iter().cloned().collect()
    }

    pub async fn len(&self) -> usize {
        self.ledger.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.ledger.read().await.is_empty()
    }

    /// Clears the validity flag. Revoking an already revoked permit is a no-op.
    pub async fn revoke(&self, permit_id: &str) -> Result<ExamPermit, Error> {
        let mut ledger = self.ledger.write().await;
        let idx = match ledger.by_id.get(permit_id) {
            Some(&idx) => idx,
            None => {
                return Err(Error::PermitNotFound {
                    message: format!("Permit `{}` does not exist!", permit_id),
                })
            }
        };
        if !ledger.permits[idx].is_valid {
            return Ok(ledger.permits[idx].clone());
        }

        ledger.permits[idx].is_valid = false;
        if let Err(err) = self.persist(&*ledger).await {
            ledger.permits[idx].is_valid = true;
            return Err(err);
        }
        Ok(ledger.permits[idx].clone())
    }

    async fn persist(&self, ledger: &Ledger) -> Result<(), Error> {
        match &self.snapshot {
            Some(path) => {
                write_snapshot(
                    path,
                    &SnapshotRef {
                        permits: &ledger.permits,
                    },
                )
                .await
            }
            None => Ok(()),
        }
    }
}
