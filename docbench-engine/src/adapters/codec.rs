//! The length-prefixed binary document encoding shared by the reference adapters.
//!
//! Stored documents are a flat sequence of field entries:
//!
//! ```text
//! [u16 name_len][name bytes][u32 value_len][value bytes (JSON)] ...
//! ```
//!
//! Finding a field therefore costs either a sequential walk over the entries (the
//! `seq_scan` strategy, cost proportional to field position) or one probe of a
//! name → offset index built at write time (the `hash_jump` strategy).

use crate::document::JsonMap;
use serde_json::{Map, Value};
use std::collections::HashMap;

/// Where a field's value bytes live inside an encoded document.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FieldSlot {
    pub offset: usize,
    pub len: usize,
}

/// Encodes ordered content into the entry sequence. Field order is preserved, which is what
/// makes position observable to the sequential strategy.
pub fn encode_content(content: &JsonMap) -> Vec<u8> {
    let mut bytes = Vec::new();
    for (name, value) in content {
        let value_bytes = serde_json::to_vec(value).expect("JSON values always serialize");
        bytes.extend_from_slice(&(name.len() as u16).to_le_bytes());
        bytes.extend_from_slice(name.as_bytes());
        bytes.extend_from_slice(&(value_bytes.len() as u32).to_le_bytes());
        bytes.extend_from_slice(&value_bytes);
    }
    bytes
}

/// Iterates the `(name, value_slot)` entries of an encoded document, in stored order.
pub struct EntryIter<'a> {
    bytes: &'a [u8],
    cursor: usize,
}

impl<'a> EntryIter<'a> {
    pub fn new(bytes: &'a [u8]) -> EntryIter<'a> {
        EntryIter { bytes, cursor: 0 }
    }
}

impl<'a> Iterator for EntryIter<'a> {
    type Item = (&'a str, FieldSlot);

    fn next(&mut self) -> Option<Self::Item> {
        if self.cursor + 2 > self.bytes.len() {
            return None;
        }
        let name_len =
            u16::from_le_bytes([self.bytes[self.cursor], self.bytes[self.cursor + 1]]) as usize;
        let name_start = self.cursor + 2;
        let name_end = name_start + name_len;
        if name_end + 4 > self.bytes.len() {
            return None;
        }
        let name = std::str::from_utf8(&self.bytes[name_start..name_end]).ok()?;
        let value_len = u32::from_le_bytes([
            self.bytes[name_end],
            self.bytes[name_end + 1],
            self.bytes[name_end + 2],
            self.bytes[name_end + 3],
        ]) as usize;
        let value_start = name_end + 4;
        if value_start + value_len > self.bytes.len() {
            return None;
        }
        self.cursor = value_start + value_len;
        Some((
            name,
            FieldSlot {
                offset: value_start,
                len: value_len,
            },
        ))
    }
}

/// Walks entries front to back until the named field is found. Returns the slot and how many
/// entries were compared on the way, which is the sequential strategy's cost.
pub fn scan_for_field(bytes: &[u8], name: &str) -> (Option<FieldSlot>, usize) {
    let mut compared = 0;
    for (entry_name, slot) in EntryIter::new(bytes) {
        compared += 1;
        if entry_name == name {
            return (Some(slot), compared);
        }
    }
    (None, compared)
}

/// Builds the name → slot index the hash-jump strategy probes at read time.
pub fn build_field_index(bytes: &[u8]) -> HashMap<String, FieldSlot> {
    EntryIter::new(bytes)
        .map(|(name, slot)| (name.to_owned(), slot))
        .collect()
}

/// Decodes one field's value bytes.
pub fn decode_value(bytes: &[u8], slot: FieldSlot) -> Option<Value> {
    serde_json::from_slice(&bytes[slot.offset..slot.offset + slot.len]).ok()
}

/// Decodes the whole document back into an ordered content map.
pub fn decode_content(bytes: &[u8]) -> JsonMap {
    let mut content = Map::new();
    for (name, slot) in EntryIter::new(bytes) {
        if let Some(value) = decode_value(bytes, slot) {
            content.insert(name.to_owned(), value);
        }
    }
    content
}
