use std::collections::{HashSet, VecDeque};

use licensegate_contracts::{RequestRecord, RequestStatus};

use crate::ids::{extract_first_int, is_reasonable_id, next_id_above};

/// In-memory request records, newest first. Callers share it behind a single mutex so id
/// allocation and insertion happen atomically.
#[derive(Debug, Default)]
pub struct RequestStore {
    records: VecDeque<RequestRecord>,
    /// Highest suffix ever stored; survives deletes so ids are never reissued.
    high_water: u64,
}

impl RequestStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocate the next id, build the record with it and insert it.
    pub fn admit<F>(&mut self, hint: Option<&str>, build: F) -> RequestRecord
    where
        F: FnOnce(String) -> RequestRecord,
    {
        let id = next_id_above(
            self.records.iter().map(|r| r.id.as_str()),
            hint,
            self.high_water,
        );
        let record = build(id);
        self.insert(record.clone());
        record
    }

    pub fn insert(&mut self, record: RequestRecord) {
        if let Some(suffix) = extract_first_int(&record.id).filter(|v| is_reasonable_id(*v)) {
            self.high_water = self.high_water.max(suffix);
        }
        self.records.push_front(record);
    }

    pub fn get(&self, id: &str) -> Option<&RequestRecord> {
        self.records.iter().find(|r| r.id == id)
    }

    pub fn update_status(&mut self, id: &str, status: RequestStatus) -> Option<RequestRecord> {
        let record = self.records.iter_mut().find(|r| r.id == id)?;
        record.status = status;
        Some(record.clone())
    }

    pub fn delete_many<S: AsRef<str>>(&mut self, ids: &[S]) -> usize {
        let doomed: HashSet<&str> = ids.iter().map(AsRef::as_ref).collect();
        let before = self.records.len();
        self.records.retain(|r| !doomed.contains(r.id.as_str()));
        before - self.records.len()
    }

    pub fn list(&self) -> Vec<RequestRecord> {
        self.records.iter().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}
