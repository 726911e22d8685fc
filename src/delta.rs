//! §4.2 Delta Index — per-session, per-frame content hashing with incremental
//! element-vector upsert.
//!
//! Grounded in `diff.rs`'s identity/change-tracking shape (`flatten_nodes`,
//! `compute_identity`, `DiffEntry`), generalized from "diagnostic diff for a human" to
//! "which elements need re-embedding" — the diff view here is retained only as a
//! diagnostic projection (`diff_against`), never consulted by `refresh()` itself.

use std::collections::HashMap;

use crate::model::{ElementDescriptor, FrameSnapshot, PageSnapshot, VectorRecord};

#[derive(Debug, Clone)]
struct Entry {
    descriptor: ElementDescriptor,
    vector: Option<Vec<f32>>,
}

/// Per-frame index: `element_key -> (descriptor, vector?)`, plus the frame's current
/// `content_hash` for the cheap unchanged-frame short circuit.
#[derive(Default)]
struct FrameIndex {
    content_hash: String,
    entries: HashMap<String, Entry>,
    /// Insertion order, preserved for the shortlist ranker's stable tie-break.
    order: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Copy)]
pub enum FieldChange {
    Added,
    Removed,
}

#[derive(Debug, Clone)]
pub struct DiffEntry {
    pub element_key: String,
    pub change: FieldChange,
}

#[derive(Debug, Clone, Default)]
pub struct DiffResult {
    pub entries: Vec<DiffEntry>,
}

/// Per-session index across all frames of a page.
#[derive(Default)]
pub struct DeltaIndex {
    frames: HashMap<Vec<String>, FrameIndex>,
    snapshot_id: u64,
}

impl DeltaIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply a new `PageSnapshot`. Returns the set of `element_key`s that need
    /// embedding (new keys only — keys present before and after retain their vector).
    pub fn refresh(&mut self, snapshot: &PageSnapshot) -> Vec<String> {
        self.snapshot_id += 1;
        let mut changed = Vec::new();
        let frames: Vec<&FrameSnapshot> = snapshot.all_frames().collect();
        for frame in frames {
            changed.extend(self.refresh_frame(frame));
        }
        changed
    }

    fn refresh_frame(&mut self, frame: &FrameSnapshot) -> Vec<String> {
        let existing = self.frames.entry(frame.frame_path.clone()).or_default();

        if existing.content_hash == frame.content_hash && !existing.content_hash.is_empty() {
            return Vec::new();
        }

        let new_keys: HashMap<String, &ElementDescriptor> =
            frame.elements.iter().map(|e| (e.element_key(), e)).collect();

        let mut changed = Vec::new();
        let mut next_entries = HashMap::with_capacity(new_keys.len());
        let mut next_order = Vec::with_capacity(new_keys.len());

        for el in &frame.elements {
            let key = el.element_key();
            let vector = existing.entries.get(&key).and_then(|e| e.vector.clone());
            if vector.is_none() {
                changed.push(key.clone());
            }
            next_order.push(key.clone());
            next_entries.insert(key, Entry { descriptor: el.clone(), vector });
        }

        existing.content_hash = frame.content_hash.clone();
        existing.entries = next_entries;
        existing.order = next_order;

        changed
    }

    /// Record freshly computed vectors for the given `element_key`s (post-embedding).
    pub fn store_vectors(&mut self, vectors: Vec<(String, Vec<f32>)>) {
        for (key, vector) in vectors {
            for frame in self.frames.values_mut() {
                if let Some(entry) = frame.entries.get_mut(&key) {
                    entry.vector = Some(vector.clone());
                }
            }
        }
    }

    pub fn all_elements(&self) -> Vec<&ElementDescriptor> {
        let mut out = Vec::new();
        for frame in self.frames.values() {
            for key in &frame.order {
                if let Some(entry) = frame.entries.get(key) {
                    out.push(&entry.descriptor);
                }
            }
        }
        out
    }

    /// Dense matrix across all frames, zero-padded for entries without a vector yet.
    /// Invariant: after `refresh()` every key in `all_elements()` has a real vector
    /// here — callers must embed all `changed_elements()` before calling this.
    pub fn vectors(&self, dim: usize) -> Vec<VectorRecord> {
        let mut out = Vec::new();
        for frame in self.frames.values() {
            for key in &frame.order {
                if let Some(entry) = frame.entries.get(key) {
                    let vector = entry.vector.clone().unwrap_or_else(|| vec![0.0; dim]);
                    out.push(VectorRecord {
                        element_key: key.clone(),
                        vector,
                        snapshot_id: self.snapshot_id,
                    });
                }
            }
        }
        out
    }

    pub fn descriptor_for(&self, element_key: &str) -> Option<&ElementDescriptor> {
        self.frames
            .values()
            .find_map(|f| f.entries.get(element_key).map(|e| &e.descriptor))
    }

    /// Diagnostic-only added/removed view between this index's current state for a
    /// frame and a previously captured key set. Never consulted by `refresh()`.
    pub fn diff_against(&self, frame_path: &[String], previous_keys: &[String]) -> DiffResult {
        let mut entries = Vec::new();
        let Some(frame) = self.frames.get(frame_path) else {
            return DiffResult { entries };
        };
        let previous: std::collections::HashSet<&String> = previous_keys.iter().collect();
        let current: std::collections::HashSet<&String> = frame.order.iter().collect();

        for key in current.difference(&previous) {
            entries.push(DiffEntry { element_key: (*key).clone(), change: FieldChange::Added });
        }
        for key in previous.difference(&current) {
            entries.push(DiffEntry { element_key: (*key).clone(), change: FieldChange::Removed });
        }
        DiffResult { entries }
    }
}
