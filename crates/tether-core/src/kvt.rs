//! Key-value tree (KVT) storage.
//!
//! The KVT holds typed data that does not fit the fixed port layout: editor
//! state, file lists, per-item settings. Names are slash-separated paths and
//! always start with `/`.
//!
//! Every entry carries two transfer flags, one per direction. Setting a flag
//! enqueues the name on that direction's FIFO queue; the receiving side drains
//! the queue with [`KvtStore::commit_next`] and the entry becomes committed
//! again. Removed entries linger until both flags are clear and are then
//! reclaimed by [`KvtStore::gc`].
//!
//! The store itself is not synchronized. It is shared between the render and
//! UI contexts through [`KvtShared`](crate::kvt_sync::KvtShared).

use std::collections::{BTreeMap, VecDeque};

use serde::Serialize;

use crate::error::{KvtError, KvtResult};

/// Binary payload with an optional content type.
///
/// A blob normally owns its bytes. A *reserved* blob only announces its size;
/// it is valid in memory but cannot be persisted.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct KvtBlob {
    content_type: Option<String>,
    size: usize,
    #[serde(skip)]
    data: Option<Vec<u8>>,
}

impl KvtBlob {
    pub fn new(content_type: Option<&str>, data: Vec<u8>) -> Self {
        Self {
            content_type: content_type.map(str::to_owned),
            size: data.len(),
            data: Some(data),
        }
    }

    /// Blob that announces `size` bytes without carrying them yet.
    pub fn reserved(content_type: Option<&str>, size: usize) -> Self {
        Self {
            content_type: content_type.map(str::to_owned),
            size,
            data: None,
        }
    }

    pub fn content_type(&self) -> Option<&str> {
        self.content_type.as_deref()
    }

    pub fn size(&self) -> usize {
        self.size
    }

    pub fn data(&self) -> Option<&[u8]> {
        self.data.as_deref()
    }

    /// A blob is persistable unless it announces bytes it does not carry.
    pub fn is_valid(&self) -> bool {
        self.size == 0 || self.data.is_some()
    }
}

/// Typed KVT value.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", content = "value", rename_all = "lowercase")]
pub enum KvtParam {
    Int32(i32),
    Uint32(u32),
    Int64(i64),
    Uint64(u64),
    Float32(f32),
    Float64(f64),
    String(String),
    Blob(KvtBlob),
}

impl KvtParam {
    /// Render the value as JSON for log dumps.
    pub fn dump(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| format!("{self:?}"))
    }
}

/// Transfer direction of a pending entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Pending {
    /// Render side to UI side.
    ToUi,
    /// UI side to render side.
    ToRender,
}

/// A drained change, handed to the receiving side.
#[derive(Debug, Clone, PartialEq)]
pub enum KvtChange {
    Set(String, KvtParam),
    Removed(String),
}

impl KvtChange {
    pub fn name(&self) -> &str {
        match self {
            Self::Set(name, _) | Self::Removed(name) => name,
        }
    }
}

#[derive(Debug, Clone)]
struct Entry {
    /// `None` once removed.
    value: Option<KvtParam>,
    to_ui: bool,
    to_render: bool,
}

impl Entry {
    fn flag(&self, dir: Pending) -> bool {
        match dir {
            Pending::ToUi => self.to_ui,
            Pending::ToRender => self.to_render,
        }
    }

    fn set_flag(&mut self, dir: Pending, on: bool) {
        match dir {
            Pending::ToUi => self.to_ui = on,
            Pending::ToRender => self.to_render = on,
        }
    }

    fn is_garbage(&self) -> bool {
        self.value.is_none() && !self.to_ui && !self.to_render
    }
}

/// Typed key-value tree with two transfer queues.
#[derive(Debug, Default)]
pub struct KvtStore {
    entries: BTreeMap<String, Entry>,
    to_ui: VecDeque<String>,
    to_render: VecDeque<String>,
}

impl KvtStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn queue_mut(&mut self, dir: Pending) -> &mut VecDeque<String> {
        match dir {
            Pending::ToUi => &mut self.to_ui,
            Pending::ToRender => &mut self.to_render,
        }
    }

    fn mark(&mut self, name: &str, dir: Pending) {
        let Some(entry) = self.entries.get_mut(name) else {
            return;
        };
        if !entry.flag(dir) {
            entry.set_flag(dir, true);
            self.queue_mut(dir).push_back(name.to_owned());
        }
    }

    fn check_name(name: &str) -> KvtResult<()> {
        if name.len() > 1 && name.starts_with('/') && !name.contains('\0') {
            Ok(())
        } else {
            Err(KvtError::InvalidName(name.to_owned()))
        }
    }

    /// Store a value. With `Some(dir)` the change is queued toward that side.
    ///
    /// Strings are persisted NUL-terminated, so a string holding a NUL byte
    /// is rejected.
    pub fn put(&mut self, name: &str, value: KvtParam, pending: Option<Pending>) -> KvtResult<()> {
        Self::check_name(name)?;
        if matches!(&value, KvtParam::String(s) if s.contains('\0')) {
            return Err(KvtError::InvalidValue(name.to_owned()));
        }
        match self.entries.get_mut(name) {
            Some(entry) => entry.value = Some(value),
            None => {
                self.entries.insert(
                    name.to_owned(),
                    Entry {
                        value: Some(value),
                        to_ui: false,
                        to_render: false,
                    },
                );
            }
        }
        if let Some(dir) = pending {
            self.mark(name, dir);
        }
        Ok(())
    }

    /// Current value of a live parameter.
    pub fn get(&self, name: &str) -> Option<&KvtParam> {
        self.entries.get(name).and_then(|e| e.value.as_ref())
    }

    /// Remove a parameter. The removal itself is queued like a change.
    pub fn remove(&mut self, name: &str, pending: Option<Pending>) -> KvtResult<KvtParam> {
        let value = self
            .entries
            .get_mut(name)
            .and_then(|e| e.value.take())
            .ok_or_else(|| KvtError::NotFound(name.to_owned()))?;
        if let Some(dir) = pending {
            self.mark(name, dir);
        }
        Ok(value)
    }

    /// Re-queue a live parameter without changing it.
    pub fn touch(&mut self, name: &str, dir: Pending) -> KvtResult<()> {
        if self.get(name).is_none() {
            return Err(KvtError::NotFound(name.to_owned()));
        }
        self.mark(name, dir);
        Ok(())
    }

    /// Queue every live parameter toward `dir`.
    pub fn touch_all(&mut self, dir: Pending) {
        let names: Vec<String> = self
            .entries
            .iter()
            .filter(|(_, e)| e.value.is_some() && !e.flag(dir))
            .map(|(name, _)| name.clone())
            .collect();
        for name in names {
            self.mark(&name, dir);
        }
    }

    /// Dequeue and commit the oldest pending change toward `dir`.
    ///
    /// Queue slots whose entry has already been committed are skipped.
    pub fn commit_next(&mut self, dir: Pending) -> Option<KvtChange> {
        while let Some(name) = self.queue_mut(dir).pop_front() {
            let Some(entry) = self.entries.get_mut(&name) else {
                continue;
            };
            if !entry.flag(dir) {
                continue;
            }
            entry.set_flag(dir, false);
            return Some(match &entry.value {
                Some(value) => KvtChange::Set(name, value.clone()),
                None => KvtChange::Removed(name),
            });
        }
        None
    }

    /// Commit every pending change toward `dir` without reading it.
    pub fn commit_all(&mut self, dir: Pending) {
        for entry in self.entries.values_mut() {
            entry.set_flag(dir, false);
        }
        self.queue_mut(dir).clear();
    }

    /// Number of queued changes toward `dir`.
    pub fn pending_len(&self, dir: Pending) -> usize {
        self.entries.values().filter(|e| e.flag(dir)).count()
    }

    /// Whether `name` has an uncommitted change toward `dir`.
    pub fn is_pending(&self, name: &str, dir: Pending) -> bool {
        self.entries.get(name).is_some_and(|e| e.flag(dir))
    }

    /// Live parameters in name order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &KvtParam)> + '_ {
        self.entries
            .iter()
            .filter_map(|(name, e)| e.value.as_ref().map(|v| (name.as_str(), v)))
    }

    /// Number of live parameters.
    pub fn len(&self) -> usize {
        self.entries.values().filter(|e| e.value.is_some()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of entries including removed ones awaiting collection.
    pub fn allocated(&self) -> usize {
        self.entries.len()
    }

    /// Drop everything, including pending changes.
    pub fn clear(&mut self) {
        self.entries.clear();
        self.to_ui.clear();
        self.to_render.clear();
    }

    /// Reclaim removed entries that both sides have seen and compact the
    /// queues.
    pub fn gc(&mut self) {
        self.entries.retain(|_, e| !e.is_garbage());
        let entries = &self.entries;
        self.to_ui
            .retain(|name| entries.get(name).is_some_and(|e| e.to_ui));
        self.to_render
            .retain(|name| entries.get(name).is_some_and(|e| e.to_render));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_put_get() {
        let mut kvt = KvtStore::new();
        kvt.put("/a", KvtParam::Int32(-3), None).unwrap();
        kvt.put("/b", KvtParam::String("x".into()), None).unwrap();
        assert_eq!(kvt.get("/a"), Some(&KvtParam::Int32(-3)));
        assert_eq!(kvt.len(), 2);
        assert_eq!(kvt.pending_len(Pending::ToUi), 0);
    }

    #[test]
    fn test_invalid_name() {
        let mut kvt = KvtStore::new();
        assert!(matches!(
            kvt.put("a", KvtParam::Int32(0), None),
            Err(KvtError::InvalidName(_))
        ));
        assert!(kvt.put("/", KvtParam::Int32(0), None).is_err());
    }

    #[test]
    fn test_string_with_nul_rejected() {
        let mut kvt = KvtStore::new();
        assert_eq!(
            kvt.put("/s", KvtParam::String("a\0b".into()), Some(Pending::ToUi)),
            Err(KvtError::InvalidValue("/s".to_owned()))
        );
        assert_eq!(kvt.get("/s"), None);
        assert_eq!(kvt.pending_len(Pending::ToUi), 0);

        kvt.put("/s", KvtParam::String("ab".into()), None).unwrap();
        assert!(kvt.put("/s", KvtParam::String("\0".into()), None).is_err());
        assert_eq!(kvt.get("/s"), Some(&KvtParam::String("ab".into())));
    }

    #[test]
    fn test_queue_is_fifo_and_deduplicated() {
        let mut kvt = KvtStore::new();
        kvt.put("/b", KvtParam::Int32(1), Some(Pending::ToUi)).unwrap();
        kvt.put("/a", KvtParam::Int32(2), Some(Pending::ToUi)).unwrap();
        kvt.put("/b", KvtParam::Int32(3), Some(Pending::ToUi)).unwrap();
        assert_eq!(kvt.pending_len(Pending::ToUi), 2);

        assert_eq!(
            kvt.commit_next(Pending::ToUi),
            Some(KvtChange::Set("/b".into(), KvtParam::Int32(3)))
        );
        assert_eq!(
            kvt.commit_next(Pending::ToUi),
            Some(KvtChange::Set("/a".into(), KvtParam::Int32(2)))
        );
        assert_eq!(kvt.commit_next(Pending::ToUi), None);
    }

    #[test]
    fn test_directions_are_independent() {
        let mut kvt = KvtStore::new();
        kvt.put("/a", KvtParam::Int32(1), Some(Pending::ToRender)).unwrap();
        assert_eq!(kvt.commit_next(Pending::ToUi), None);
        assert!(kvt.is_pending("/a", Pending::ToRender));
        kvt.commit_all(Pending::ToRender);
        assert!(!kvt.is_pending("/a", Pending::ToRender));
        assert_eq!(kvt.commit_next(Pending::ToRender), None);
    }

    #[test]
    fn test_touch_all() {
        let mut kvt = KvtStore::new();
        kvt.put("/a", KvtParam::Int32(1), None).unwrap();
        kvt.put("/b", KvtParam::Int32(2), None).unwrap();
        kvt.touch_all(Pending::ToUi);
        assert_eq!(kvt.pending_len(Pending::ToUi), 2);
        assert!(kvt.touch("/missing", Pending::ToUi).is_err());
    }

    #[test]
    fn test_remove_and_gc() {
        let mut kvt = KvtStore::new();
        kvt.put("/a", KvtParam::Float64(1.5), None).unwrap();
        assert_eq!(kvt.remove("/a", Some(Pending::ToUi)), Ok(KvtParam::Float64(1.5)));
        assert_eq!(kvt.get("/a"), None);

        // Still pending toward the UI, so it survives collection.
        kvt.gc();
        assert_eq!(kvt.allocated(), 1);

        assert_eq!(kvt.commit_next(Pending::ToUi), Some(KvtChange::Removed("/a".into())));
        kvt.gc();
        assert_eq!(kvt.allocated(), 0);
        assert!(kvt.remove("/a", None).is_err());
    }

    #[test]
    fn test_gc_keeps_pending_changes() {
        let mut kvt = KvtStore::new();
        kvt.put("/a", KvtParam::Int32(1), Some(Pending::ToUi)).unwrap();
        kvt.commit_all(Pending::ToUi);
        kvt.put("/a", KvtParam::Int32(2), Some(Pending::ToUi)).unwrap();
        kvt.gc();
        assert_eq!(kvt.to_ui.len(), 1);
        assert_eq!(
            kvt.commit_next(Pending::ToUi),
            Some(KvtChange::Set("/a".into(), KvtParam::Int32(2)))
        );
    }

    #[test]
    fn test_reserved_blob() {
        let blob = KvtBlob::reserved(Some("image/png"), 16);
        assert!(!blob.is_valid());
        assert_eq!(blob.size(), 16);
        assert!(KvtBlob::new(None, Vec::new()).is_valid());
        assert!(KvtBlob::reserved(None, 0).is_valid());
    }

    #[test]
    fn test_dump() {
        assert_eq!(KvtParam::Uint32(7).dump(), r#"{"type":"uint32","value":7}"#);
    }
}
