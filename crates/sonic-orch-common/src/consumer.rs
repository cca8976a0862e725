//! Per-table queue of pending change records.

use std::collections::{BTreeMap, VecDeque};

/// Operation carried by a change record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    /// Set operation (add or update)
    Set,
    /// Delete operation
    Del,
}

impl Operation {
    /// Returns true if this is a Set operation.
    pub fn is_set(&self) -> bool {
        matches!(self, Operation::Set)
    }

    /// Returns true if this is a Del operation.
    pub fn is_del(&self) -> bool {
        matches!(self, Operation::Del)
    }
}

/// A field-value pair from a table row.
pub type FieldValue = (String, String);

/// Key, operation, and field-values tuple.
///
/// This is the fundamental unit of data consumed from watched tables.
#[derive(Debug, Clone)]
pub struct KeyOpFieldsValues {
    /// The key (e.g., "Ethernet0", "PortChannel1|Ethernet4")
    pub key: String,
    /// The operation (Set or Del)
    pub op: Operation,
    /// Field-value pairs (empty for Del operations)
    pub fvs: Vec<FieldValue>,
}

impl KeyOpFieldsValues {
    /// Creates a new entry.
    pub fn new(key: impl Into<String>, op: Operation, fvs: Vec<FieldValue>) -> Self {
        Self {
            key: key.into(),
            op,
            fvs,
        }
    }

    /// Creates a Set entry.
    pub fn set(key: impl Into<String>, fvs: Vec<FieldValue>) -> Self {
        Self::new(key, Operation::Set, fvs)
    }

    /// Creates a Del entry.
    pub fn del(key: impl Into<String>) -> Self {
        Self::new(key, Operation::Del, vec![])
    }

    /// Returns the value for a field, if present.
    pub fn get_field(&self, field: &str) -> Option<&str> {
        self.fvs
            .iter()
            .find(|(f, _)| f == field)
            .map(|(_, v)| v.as_str())
    }

    /// Returns true if this entry has the given field.
    pub fn has_field(&self, field: &str) -> bool {
        self.fvs.iter().any(|(f, _)| f == field)
    }
}

/// Configuration for a Consumer.
#[derive(Debug, Clone)]
pub struct ConsumerConfig {
    /// Table name (e.g., "PORT", "PORTCHANNEL_MEMBER")
    pub table_name: String,
}

impl ConsumerConfig {
    /// Creates a new consumer config.
    pub fn new(table_name: impl Into<String>) -> Self {
        Self {
            table_name: table_name.into(),
        }
    }
}

/// Consumer for table change records.
///
/// A Consumer holds the change records of one watched table until the
/// owning Orch processes them. It handles:
///
/// - Deduplication of operations on the same key
/// - Deferral of records whose dependencies are not met yet
///
/// # Deduplication Logic
///
/// When multiple operations arrive for the same key:
/// - Multiple DEL: Keep only the latest
/// - Multiple SET: Merge field-values (newer overwrites older)
/// - DEL then SET: Keep both (maintain ordering)
///
/// # Deferral
///
/// [`Consumer::drain`] hands every pending record to the caller for one
/// pass. Records that could not be applied go back through
/// [`Consumer::defer`] and stay ahead of anything that arrived for the same
/// key in the meantime.
pub struct Consumer {
    config: ConsumerConfig,
    /// Pending tasks indexed by key for deduplication
    to_sync: BTreeMap<String, VecDeque<KeyOpFieldsValues>>,
    /// Total count of pending entries
    pending_count: usize,
}

impl Consumer {
    /// Creates a new consumer with the given configuration.
    pub fn new(config: ConsumerConfig) -> Self {
        Self {
            config,
            to_sync: BTreeMap::new(),
            pending_count: 0,
        }
    }

    /// Returns the table name.
    pub fn table_name(&self) -> &str {
        &self.config.table_name
    }

    /// Returns true if there are pending entries.
    pub fn has_pending(&self) -> bool {
        self.pending_count > 0
    }

    /// Returns the number of pending entries.
    pub fn pending_count(&self) -> usize {
        self.pending_count
    }

    /// Adds entries to the sync queue with deduplication.
    ///
    /// - For same-key operations, newer SET values override older ones
    /// - DEL operations clear pending SETs for the same key
    pub fn add_to_sync(&mut self, entries: Vec<KeyOpFieldsValues>) {
        for entry in entries {
            self.add_single_entry(entry);
        }
    }

    fn add_single_entry(&mut self, entry: KeyOpFieldsValues) {
        let queue = self.to_sync.entry(entry.key.clone()).or_default();

        match entry.op {
            Operation::Del => {
                self.pending_count -= queue.len();
                queue.clear();
                queue.push_back(entry);
                self.pending_count += 1;
            }
            Operation::Set => {
                if let Some(last) = queue.back_mut() {
                    if last.op == Operation::Set {
                        merge_fields(&mut last.fvs, entry.fvs);
                        return;
                    }
                }
                queue.push_back(entry);
                self.pending_count += 1;
            }
        }
    }

    /// Takes every pending record, ordered by key and then by arrival.
    pub fn drain(&mut self) -> Vec<KeyOpFieldsValues> {
        self.pending_count = 0;
        std::mem::take(&mut self.to_sync)
            .into_values()
            .flatten()
            .collect()
    }

    /// Hands back records from the last [`drain`](Self::drain) that were not
    /// applied.
    ///
    /// Each record is put in front of whatever is queued for its key now:
    /// - a deferred SET is dropped when a DEL for the key is already queued
    /// - a deferred SET absorbs a queued SET, the queued values win
    /// - a deferred DEL is kept ahead of anything newer
    pub fn defer(&mut self, entries: Vec<KeyOpFieldsValues>) {
        // Reverse so records deferred for the same key keep their order.
        for entry in entries.into_iter().rev() {
            self.defer_single_entry(entry);
        }
    }

    fn defer_single_entry(&mut self, mut entry: KeyOpFieldsValues) {
        let queue = self.to_sync.entry(entry.key.clone()).or_default();

        if entry.op.is_set() {
            if queue.iter().any(|e| e.op.is_del()) {
                return;
            }
            if let Some(newer) = queue.pop_front() {
                merge_fields(&mut entry.fvs, newer.fvs);
                self.pending_count -= 1;
            }
        }

        queue.push_front(entry);
        self.pending_count += 1;
    }

    /// Dumps pending entries for debugging.
    pub fn dump(&self) -> Vec<String> {
        self.to_sync
            .iter()
            .flat_map(|(key, queue)| {
                queue.iter().map(move |e| {
                    format!(
                        "{}|{}: {} {:?}",
                        self.config.table_name,
                        key,
                        if e.op.is_set() { "SET" } else { "DEL" },
                        e.fvs
                    )
                })
            })
            .collect()
    }
}

/// Merges `newer` into `base`; values from `newer` overwrite.
fn merge_fields(base: &mut Vec<FieldValue>, newer: Vec<FieldValue>) {
    for (field, value) in newer {
        if let Some(existing) = base.iter_mut().find(|(f, _)| *f == field) {
            existing.1 = value;
        } else {
            base.push((field, value));
        }
    }
}
