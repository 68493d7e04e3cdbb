//! In-memory record map shared between the store and the index rebuilder.

use std::collections::HashMap;

use parking_lot::RwLock;
use uuid::Uuid;

use docket_core::{DocumentRecord, RecordSource};

/// The authoritative in-memory collection of records.
///
/// Only [`RecordStore`](crate::RecordStore) mutates it; the rebuilder reads
/// it through [`RecordSource`].
#[derive(Default)]
pub struct RecordTable {
    records: RwLock<HashMap<Uuid, DocumentRecord>>,
}

impl RecordTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn load(&self, records: Vec<DocumentRecord>) {
        let mut map = self.records.write();
        map.clear();
        map.extend(records.into_iter().map(|r| (r.id, r)));
    }

    pub(crate) fn upsert(&self, record: DocumentRecord) -> Option<DocumentRecord> {
        self.records.write().insert(record.id, record)
    }

    pub(crate) fn remove(&self, id: &Uuid) -> Option<DocumentRecord> {
        self.records.write().remove(id)
    }

    /// Apply `f` to the stored record under the write lock.
    pub(crate) fn modify<F>(&self, id: &Uuid, f: F) -> Option<DocumentRecord>
    where
        F: FnOnce(&mut DocumentRecord),
    {
        let mut map = self.records.write();
        let record = map.get_mut(id)?;
        f(record);
        Some(record.clone())
    }

    pub fn get(&self, id: &Uuid) -> Option<DocumentRecord> {
        self.records.read().get(id).cloned()
    }

    pub fn contains(&self, id: &Uuid) -> bool {
        self.records.read().contains_key(id)
    }

    /// All records, newest `created_at` first (ties by id for stability).
    pub fn sorted_newest_first(&self) -> Vec<DocumentRecord> {
        let mut records: Vec<DocumentRecord> = self.records.read().values().cloned().collect();
        records.sort_by(|a, b| b.created_at.cmp(&a.created_at).then_with(|| a.id.cmp(&b.id)));
        records
    }

    /// Newest record whose `field` equals `value`.
    pub fn find_by_field(&self, field: &str, value: &str) -> Option<DocumentRecord> {
        self.records
            .read()
            .values()
            .filter(|r| r.field_value(field).as_deref() == Some(value))
            .max_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| b.id.cmp(&a.id)))
            .cloned()
    }
}

impl RecordSource for RecordTable {
    fn snapshot(&self) -> Vec<DocumentRecord> {
        self.records.read().values().cloned().collect()
    }

    fn len(&self) -> usize {
        self.records.read().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn test_upsert_get_remove() {
        let table = RecordTable::new();
        let record = DocumentRecord::new("a.txt", "text/plain", 1, "/a");
        assert!(table.upsert(record.clone()).is_none());
        assert_eq!(table.get(&record.id), Some(record.clone()));
        assert_eq!(table.len(), 1);
        assert_eq!(table.remove(&record.id), Some(record.clone()));
        assert!(!table.contains(&record.id));
        assert!(table.is_empty());
    }

    #[test]
    fn test_sorted_newest_first() {
        let table = RecordTable::new();
        let mut old = DocumentRecord::new("old.txt", "text/plain", 1, "/old");
        old.created_at -= Duration::days(1);
        let new = DocumentRecord::new("new.txt", "text/plain", 1, "/new");
        table.upsert(old.clone());
        table.upsert(new.clone());

        let names: Vec<String> = table
            .sorted_newest_first()
            .into_iter()
            .map(|r| r.original_name)
            .collect();
        assert_eq!(names, vec!["new.txt", "old.txt"]);
    }

    #[test]
    fn test_find_by_field_prefers_newest() {
        let table = RecordTable::new();
        let mut old = DocumentRecord::new("dup.txt", "text/plain", 1, "/1")
            .with_metadata("author", "kim");
        old.created_at -= Duration::hours(2);
        let new = DocumentRecord::new("dup.txt", "text/plain", 2, "/2")
            .with_metadata("author", "kim");
        table.upsert(old);
        table.upsert(new.clone());

        assert_eq!(table.find_by_field("originalName", "dup.txt").map(|r| r.id), Some(new.id));
        assert_eq!(table.find_by_field("metadata.author", "kim").map(|r| r.id), Some(new.id));
        assert!(table.find_by_field("mimeType", "application/pdf").is_none());
    }

    #[test]
    fn test_modify_in_place() {
        let table = RecordTable::new();
        let record = DocumentRecord::new("a.txt", "text/plain", 1, "/a");
        table.upsert(record.clone());
        let updated = table
            .modify(&record.id, |r| r.set_extracted_text("hello"))
            .unwrap();
        assert_eq!(updated.extracted_text, "hello");
        assert!(table.modify(&Uuid::new_v4(), |_| {}).is_none());
    }
}
