//! The in-memory document representation.
//!
//! A [JsonDocument] is an external identifier plus an *ordered* mapping from field names to JSON
//! values. Field insertion order is preserved end to end (via `serde_json`'s `preserve_order`
//! feature), because a field's position is exactly what a scan-based traversal pays for.

use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// The ordered field map used as document content.
pub type JsonMap = Map<String, Value>;

/// One segment of a dotted document path: a field name, optionally followed by an array index
/// (`addresses[1]`).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PathSegment {
    pub name: String,
    pub index: Option<usize>,
}

/// Parses a dotted path (`customer.addresses[1].zip`) into its segments. An empty path yields no
/// segments. A segment that does not match the `name[index]` shape is treated as a literal field
/// name, so lookups against it simply miss.
pub fn parse_path(path: &str) -> Vec<PathSegment> {
    lazy_static! {
        static ref REGEX_SEGMENT: Regex = Regex::new(r"^([^\[\]]+)\[(\d+)\]$").unwrap();
    }

    if path.is_empty() {
        return Vec::new();
    }
    path.split('.')
        .map(|segment| match REGEX_SEGMENT.captures(segment) {
            Some(capture) => PathSegment {
                name: capture[1].to_owned(),
                index: capture[2].parse().ok(),
            },
            None => PathSegment {
                name: segment.to_owned(),
                index: None,
            },
        })
        .collect()
}

/// A document: an external identifier plus ordered JSON content.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct JsonDocument {
    id: String,
    content: JsonMap,
}

impl JsonDocument {
    /// Constructs a document from the specified content. If the content has no `_id` field, the
    /// identifier is inserted as `_id`, ahead of every other field.
    pub fn new(id: impl Into<String>, content: JsonMap) -> JsonDocument {
        let id = id.into();
        let content = if content.contains_key("_id") {
            content
        } else {
            let mut keyed = Map::new();
            keyed.insert("_id".to_owned(), Value::String(id.clone()));
            keyed.extend(content);
            keyed
        };
        JsonDocument { id, content }
    }

    /// Constructs a document whose content is just the `_id` field.
    pub fn empty(id: impl Into<String>) -> JsonDocument {
        JsonDocument::new(id, Map::new())
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn content(&self) -> &JsonMap {
        &self.content
    }

    /// Returns the document content as a JSON value.
    pub fn to_value(&self) -> Value {
        Value::Object(self.content.clone())
    }

    /// Returns the value at the specified dotted path, or `None` on any broken link: a missing
    /// field, an index into a non-array, an index past the end.
    pub fn get_path(&self, path: &str) -> Option<&Value> {
        let segments = parse_path(path);
        let (first, rest) = segments.split_first()?;

        let mut current = resolve_segment_in_map(&self.content, first)?;
        for segment in rest {
            current = resolve_segment(current, segment)?;
        }
        Some(current)
    }

    /// Returns `true` if the specified dotted path resolves to a value.
    pub fn has_path(&self, path: &str) -> bool {
        self.get_path(path).is_some()
    }

    /// Sets the value at the specified dotted path, creating intermediate objects and extending
    /// arrays (with null elements) as needed. An empty path is a no-op.
    pub fn set_path(&mut self, path: &str, value: Value) {
        let segments = parse_path(path);
        if segments.is_empty() {
            return;
        }
        set_in_map(&mut self.content, &segments, value);
    }
}

fn resolve_segment_in_map<'a>(map: &'a JsonMap, segment: &PathSegment) -> Option<&'a Value> {
    let field = map.get(&segment.name)?;
    match segment.index {
        Some(index) => field.as_array()?.get(index),
        None => Some(field),
    }
}

fn resolve_segment<'a>(value: &'a Value, segment: &PathSegment) -> Option<&'a Value> {
    resolve_segment_in_map(value.as_object()?, segment)
}

fn set_in_map(map: &mut JsonMap, segments: &[PathSegment], value: Value) {
    let segment = &segments[0];
    let rest = &segments[1..];

    match segment.index {
        None => {
            if rest.is_empty() {
                map.insert(segment.name.clone(), value);
            } else {
                let slot = map
                    .entry(segment.name.clone())
                    .or_insert_with(|| Value::Object(Map::new()));
                if !slot.is_object() {
                    *slot = Value::Object(Map::new());
                }
                set_in_map(slot.as_object_mut().expect("just ensured object"), rest, value);
            }
        }
        Some(index) => {
            let slot = map
                .entry(segment.name.clone())
                .or_insert_with(|| Value::Array(Vec::new()));
            if !slot.is_array() {
                *slot = Value::Array(Vec::new());
            }
            let array = slot.as_array_mut().expect("just ensured array");
            while array.len() <= index {
                array.push(Value::Null);
            }
            if rest.is_empty() {
                array[index] = value;
            } else {
                let element = &mut array[index];
                if !element.is_object() {
                    *element = Value::Object(Map::new());
                }
                set_in_map(
                    element.as_object_mut().expect("just ensured object"),
                    rest,
                    value,
                );
            }
        }
    }
}
