//! The workspace index: definitions and references keyed by [`TableKey`].
//!
//! # Invariants
//!
//! - Every entry in either map is attributed to a file that is currently
//!   indexed. Removing or re-indexing a file removes everything it contributed.
//! - Re-indexing a file replaces its entries; it never appends to them.
//! - A key whose list becomes empty is removed from its map.
//! - `last_updated` strictly increases with every mutation.
//!
//! Mutation is crate-private. Outside callers go through
//! [`IndexManager`](crate::IndexManager), which serializes updates and keeps
//! persistence in step with them.

use chrono::{DateTime, Duration, Utc};
use std::collections::{HashMap, HashSet};

use crate::key::TableKey;
use crate::snapshot::{estimate_definition_bytes, estimate_file_bytes, estimate_reference_bytes};
use crate::types::{Definition, Reference};

/// What one file contributed to the index.
///
/// Tracking the keys per file lets removal visit only the buckets the file
/// touched instead of scanning the whole index.
#[derive(Debug, Clone)]
pub(crate) struct FileContribution {
    pub(crate) definition_keys: HashSet<TableKey>,
    pub(crate) reference_keys: HashSet<TableKey>,
    /// Update order; higher is more recent
    pub(crate) sequence: u64,
    /// Estimated bytes this file adds to a serialized snapshot
    pub(crate) estimated_bytes: usize,
}

impl FileContribution {
    fn new(path: &str, sequence: u64) -> Self {
        Self {
            definition_keys: HashSet::new(),
            reference_keys: HashSet::new(),
            sequence,
            estimated_bytes: estimate_file_bytes(path),
        }
    }
}

/// Cross-file map of SQL definitions and references.
#[derive(Debug, Clone, Default)]
pub struct WorkspaceIndex {
    definition_map: HashMap<TableKey, Vec<Definition>>,
    reference_map: HashMap<TableKey, Vec<Reference>>,
    files: HashMap<String, FileContribution>,
    last_updated: Option<DateTime<Utc>>,
    next_sequence: u64,
}

impl WorkspaceIndex {
    /// Create an empty index that has never been updated.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// All definitions, keyed by table key.
    #[must_use]
    pub fn definition_map(&self) -> &HashMap<TableKey, Vec<Definition>> {
        &self.definition_map
    }

    /// All references, keyed by table key.
    #[must_use]
    pub fn reference_map(&self) -> &HashMap<TableKey, Vec<Reference>> {
        &self.reference_map
    }

    /// Definitions under `key`; empty when the key is not defined anywhere.
    #[must_use]
    pub fn definitions(&self, key: &TableKey) -> &[Definition] {
        self.definition_map.get(key).map_or(&[], Vec::as_slice)
    }

    /// References under `key`; empty when the key is not referenced anywhere.
    #[must_use]
    pub fn references(&self, key: &TableKey) -> &[Reference] {
        self.reference_map.get(key).map_or(&[], Vec::as_slice)
    }

    /// Number of indexed files, including files that contributed no entries.
    #[must_use]
    pub fn file_count(&self) -> usize {
        self.files.len()
    }

    /// When the index last changed; `None` if it never has.
    #[must_use]
    pub fn last_updated(&self) -> Option<DateTime<Utc>> {
        self.last_updated
    }

    /// Whether `path` is currently indexed.
    #[must_use]
    pub fn contains_file(&self, path: &str) -> bool {
        self.files.contains_key(path)
    }

    /// Indexed file paths, least recently updated first.
    #[must_use]
    pub fn indexed_files(&self) -> Vec<&str> {
        self.files_by_recency()
            .into_iter()
            .map(|(path, _)| path)
            .collect()
    }

    /// Definitions contributed by `path`.
    #[must_use]
    pub fn definitions_in_file(&self, path: &str) -> Vec<&Definition> {
        let Some(contribution) = self.files.get(path) else {
            return Vec::new();
        };
        contribution
            .definition_keys
            .iter()
            .flat_map(|key| self.definitions(key))
            .filter(|def| def.file_path == path)
            .collect()
    }

    /// References contributed by `path`.
    #[must_use]
    pub fn references_in_file(&self, path: &str) -> Vec<&Reference> {
        let Some(contribution) = self.files.get(path) else {
            return Vec::new();
        };
        contribution
            .reference_keys
            .iter()
            .flat_map(|key| self.references(key))
            .filter(|reference| reference.file_path == path)
            .collect()
    }

    /// Total number of definition entries.
    #[must_use]
    pub fn definition_count(&self) -> usize {
        self.definition_map.values().map(Vec::len).sum()
    }

    /// Total number of reference entries.
    #[must_use]
    pub fn reference_count(&self) -> usize {
        self.reference_map.values().map(Vec::len).sum()
    }

    /// Sum of the per-file size estimates. O(files).
    pub(crate) fn estimated_entry_bytes(&self) -> usize {
        self.files.values().map(|c| c.estimated_bytes).sum()
    }

    /// `(path, estimated bytes)` pairs, least recently updated first.
    pub(crate) fn files_by_recency(&self) -> Vec<(&str, usize)> {
        let mut files: Vec<_> = self
            .files
            .iter()
            .map(|(path, c)| (path.as_str(), c.sequence, c.estimated_bytes))
            .collect();
        files.sort_by_key(|(_, sequence, _)| *sequence);
        files
            .into_iter()
            .map(|(path, _, bytes)| (path, bytes))
            .collect()
    }

    // === Mutation (crate-private) ===

    /// Replace everything `path` contributed with `definitions` and
    /// `references`.
    ///
    /// Every entry is attributed to `path`, whatever its `file_path` said.
    pub(crate) fn replace_file(
        &mut self,
        path: &str,
        definitions: Vec<Definition>,
        references: Vec<Reference>,
        now: DateTime<Utc>,
    ) {
        self.detach_file(path);
        self.register_file(path);

        for mut definition in definitions {
            definition.file_path = path.to_string();
            self.insert_definition(definition);
        }
        for mut reference in references {
            reference.file_path = path.to_string();
            self.insert_reference(reference);
        }

        self.touch(now);
    }

    /// Drop everything `path` contributed. Returns `false` if the file was
    /// not indexed, in which case nothing changes.
    pub(crate) fn remove_file(&mut self, path: &str, now: DateTime<Utc>) -> bool {
        if self.detach_file(path).is_none() {
            return false;
        }
        self.touch(now);
        true
    }

    /// Rebuild an index from persisted parts without touching `last_updated`.
    ///
    /// `file_order` lists files least recently updated first; files that only
    /// appear in entries are appended after them.
    pub(crate) fn restore(
        file_order: impl IntoIterator<Item = String>,
        definitions: Vec<Definition>,
        references: Vec<Reference>,
        last_updated: Option<DateTime<Utc>>,
    ) -> Self {
        let mut index = Self::new();
        for path in file_order {
            index.register_file(&path);
        }
        for definition in definitions {
            index.insert_definition(definition);
        }
        for reference in references {
            index.insert_reference(reference);
        }
        index.last_updated = last_updated;
        index
    }

    fn register_file(&mut self, path: &str) -> &mut FileContribution {
        let next_sequence = &mut self.next_sequence;
        self.files.entry(path.to_string()).or_insert_with(|| {
            let sequence = *next_sequence;
            *next_sequence += 1;
            FileContribution::new(path, sequence)
        })
    }

    fn insert_definition(&mut self, definition: Definition) {
        let key = definition.key();
        let bytes = estimate_definition_bytes(&definition, &key);
        let contribution = self.register_file(&definition.file_path);
        contribution.estimated_bytes += bytes;
        contribution.definition_keys.insert(key.clone());
        self.definition_map.entry(key).or_default().push(definition);
    }

    fn insert_reference(&mut self, reference: Reference) {
        let key = reference.key();
        let bytes = estimate_reference_bytes(&reference, &key);
        let contribution = self.register_file(&reference.file_path);
        contribution.estimated_bytes += bytes;
        contribution.reference_keys.insert(key.clone());
        self.reference_map.entry(key).or_default().push(reference);
    }

    /// Remove the file's bookkeeping and every entry it contributed,
    /// dropping keys left empty.
    fn detach_file(&mut self, path: &str) -> Option<FileContribution> {
        let contribution = self.files.remove(path)?;

        for key in &contribution.definition_keys {
            if let Some(list) = self.definition_map.get_mut(key) {
                list.retain(|def| def.file_path != path);
                if list.is_empty() {
                    self.definition_map.remove(key);
                }
            }
        }
        for key in &contribution.reference_keys {
            if let Some(list) = self.reference_map.get_mut(key) {
                list.retain(|reference| reference.file_path != path);
                if list.is_empty() {
                    self.reference_map.remove(key);
                }
            }
        }

        Some(contribution)
    }

    /// Advance `last_updated`, never backwards even if the clock is.
    fn touch(&mut self, now: DateTime<Utc>) {
        let next = match self.last_updated {
            Some(previous) if now <= previous => previous + Duration::milliseconds(1),
            _ => now,
        };
        self.last_updated = Some(next);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::key::normalize_key;
    use crate::types::DefinitionKind;

    fn table(name: &str, line: u32) -> Definition {
        Definition::new(name, DefinitionKind::Table, "", line)
    }

    fn reference(name: &str, line: u32) -> Reference {
        Reference::new(name, "", line)
    }

    fn at(seconds: i64) -> DateTime<Utc> {
        DateTime::from_timestamp(1_700_000_000 + seconds, 0).unwrap()
    }

    #[test]
    fn new_index_is_empty_and_never_updated() {
        let index = WorkspaceIndex::new();

        assert_eq!(index.file_count(), 0);
        assert!(index.last_updated().is_none());
        assert!(index.definition_map().is_empty());
        assert!(index.reference_map().is_empty());
    }

    #[test]
    fn replace_file_attributes_entries_to_path() {
        let mut index = WorkspaceIndex::new();
        let mut def = table("orders", 1);
        def.file_path = "somewhere/else.sql".to_string();

        index.replace_file("a.sql", vec![def], vec![reference("customers", 4)], at(0));

        let key = normalize_key("orders", None);
        assert_eq!(index.definitions(&key)[0].file_path, "a.sql");
        assert_eq!(index.references_in_file("a.sql")[0].file_path, "a.sql");
    }

    #[test]
    fn replace_file_twice_does_not_grow_lists() {
        let mut index = WorkspaceIndex::new();
        let defs = vec![table("orders", 1), table("orders", 9)];
        let refs = vec![reference("orders", 3)];

        index.replace_file("a.sql", defs.clone(), refs.clone(), at(0));
        index.replace_file("a.sql", defs, refs, at(1));

        let key = normalize_key("orders", None);
        assert_eq!(index.definitions(&key).len(), 2);
        assert_eq!(index.references(&key).len(), 1);
        assert_eq!(index.file_count(), 1);
    }

    #[test]
    fn replace_file_drops_keys_the_file_no_longer_mentions() {
        let mut index = WorkspaceIndex::new();
        index.replace_file("a.sql", vec![table("orders", 1)], vec![reference("customers", 2)], at(0));

        index.replace_file("a.sql", vec![table("invoices", 1)], vec![], at(1));

        assert!(index.definitions(&normalize_key("orders", None)).is_empty());
        assert!(!index.reference_map().contains_key(&normalize_key("customers", None)));
        assert_eq!(index.definitions(&normalize_key("invoices", None)).len(), 1);
    }

    #[test]
    fn shared_keys_keep_entries_from_other_files() {
        let mut index = WorkspaceIndex::new();
        index.replace_file("a.sql", vec![table("orders", 1)], vec![], at(0));
        index.replace_file("b.sql", vec![table("ORDERS", 5)], vec![], at(1));

        assert!(index.remove_file("a.sql", at(2)));

        let remaining = index.definitions(&normalize_key("orders", None));
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].file_path, "b.sql");
    }

    #[test]
    fn remove_file_drops_emptied_keys() {
        let mut index = WorkspaceIndex::new();
        index.replace_file("a.sql", vec![table("orders", 1)], vec![reference("orders", 2)], at(0));

        assert!(index.remove_file("a.sql", at(1)));

        assert!(index.definition_map().is_empty());
        assert!(index.reference_map().is_empty());
        assert_eq!(index.file_count(), 0);
    }

    #[test]
    fn remove_unknown_file_changes_nothing() {
        let mut index = WorkspaceIndex::new();
        index.replace_file("a.sql", vec![table("orders", 1)], vec![], at(0));
        let before = index.last_updated();

        assert!(!index.remove_file("missing.sql", at(5)));
        assert_eq!(index.last_updated(), before);
    }

    #[test]
    fn empty_scan_still_counts_as_indexed_file() {
        let mut index = WorkspaceIndex::new();
        index.replace_file("empty.sql", vec![], vec![], at(0));

        assert_eq!(index.file_count(), 1);
        assert!(index.contains_file("empty.sql"));
    }

    #[test]
    fn last_updated_never_moves_backwards() {
        let mut index = WorkspaceIndex::new();
        index.replace_file("a.sql", vec![], vec![], at(10));
        let first = index.last_updated().unwrap();

        index.replace_file("b.sql", vec![], vec![], at(0));
        let second = index.last_updated().unwrap();

        assert!(second > first);
    }

    #[test]
    fn recency_order_follows_updates() {
        let mut index = WorkspaceIndex::new();
        index.replace_file("a.sql", vec![], vec![], at(0));
        index.replace_file("b.sql", vec![], vec![], at(1));
        index.replace_file("a.sql", vec![], vec![], at(2));

        assert_eq!(index.indexed_files(), vec!["b.sql", "a.sql"]);
    }

    #[test]
    fn estimated_bytes_track_file_contents() {
        let mut index = WorkspaceIndex::new();
        index.replace_file("a.sql", vec![table("orders", 1)], vec![], at(0));
        let small = index.estimated_entry_bytes();

        index.replace_file(
            "a.sql",
            vec![table("orders", 1), table("a_much_longer_table_name", 2)],
            vec![reference("customers", 3)],
            at(1),
        );
        assert!(index.estimated_entry_bytes() > small);

        index.remove_file("a.sql", at(2));
        assert_eq!(index.estimated_entry_bytes(), 0);
    }

    #[test]
    fn restore_preserves_given_file_order() {
        let mut def = table("orders", 1);
        def.file_path = "b.sql".to_string();

        let index = WorkspaceIndex::restore(
            vec!["c.sql".to_string(), "b.sql".to_string()],
            vec![def],
            vec![],
            Some(at(0)),
        );

        assert_eq!(index.indexed_files(), vec!["c.sql", "b.sql"]);
        assert_eq!(index.last_updated(), Some(at(0)));
        assert_eq!(index.definitions_in_file("b.sql").len(), 1);
    }
}
