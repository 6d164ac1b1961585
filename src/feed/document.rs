//! JSON:API document parser for the upstream predictions feed.
//!
//! Only the envelope is typed: `data` and `included` resources with their
//! `type`, `id`, `attributes` and `relationships`. Attribute values are read
//! lazily through helpers because side-table resources of different types share
//! the same shape.

use anyhow::Result;
use serde::Deserialize;
use serde_json::{Map, Value};
use std::collections::HashMap;

/// Top-level response body.
#[derive(Debug, Default, Deserialize)]
pub struct FeedDocument {
    #[serde(default)]
    pub data: Vec<Resource>,
    #[serde(default)]
    pub included: Vec<Resource>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Resource {
    #[serde(rename = "type")]
    pub kind: String,
    pub id: String,
    #[serde(default)]
    pub attributes: Map<String, Value>,
    #[serde(default)]
    pub relationships: HashMap<String, Relationship>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Relationship {
    #[serde(default)]
    pub data: Option<Linkage>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum Linkage {
    One(ResourceRef),
    Many(Vec<ResourceRef>),
}

#[derive(Debug, Clone, Deserialize)]
pub struct ResourceRef {
    #[serde(rename = "type")]
    pub kind: String,
    pub id: String,
}

impl Resource {
    pub fn attr_str(&self, name: &str) -> Option<&str> {
        self.attributes.get(name).and_then(Value::as_str)
    }

    pub fn attr_i64(&self, name: &str) -> Option<i64> {
        self.attributes.get(name).and_then(Value::as_i64)
    }

    /// Id of a to-one relationship, `None` when missing, null or to-many.
    pub fn related_id(&self, name: &str) -> Option<&str> {
        match self.relationships.get(name)?.data.as_ref()? {
            Linkage::One(r) => Some(r.id.as_str()),
            Linkage::Many(_) => None,
        }
    }
}

/// `included` resources indexed by id, one map per resource type.
#[derive(Debug, Default)]
pub struct SideTables<'a> {
    pub vehicles: HashMap<&'a str, &'a Resource>,
    pub schedules: HashMap<&'a str, &'a Resource>,
    pub stops: HashMap<&'a str, &'a Resource>,
    pub trips: HashMap<&'a str, &'a Resource>,
}

impl<'a> SideTables<'a> {
    pub fn build(included: &'a [Resource]) -> Self {
        let mut tables = SideTables::default();
        for r in included {
            let table = match r.kind.as_str() {
                "vehicle" => &mut tables.vehicles,
                "schedule" => &mut tables.schedules,
                "stop" => &mut tables.stops,
                "trip" => &mut tables.trips,
                _ => continue,
            };
            table.insert(r.id.as_str(), r);
        }
        tables
    }
}

/// Decodes a JSON:API [`FeedDocument`] from raw bytes.
///
/// # Errors
///
/// Returns an error if the bytes are not JSON or lack the envelope shape.
pub fn parse_document(bytes: &[u8]) -> Result<FeedDocument> {
    Ok(serde_json::from_slice(bytes)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_empty_object_returns_default_document() {
        let doc = parse_document(b"{}").unwrap();
        assert!(doc.data.is_empty());
        assert!(doc.included.is_empty());
    }

    #[test]
    fn test_parse_invalid_bytes() {
        assert!(parse_document(&[0xFF, 0xFE, 0x00, 0x01]).is_err());
        assert!(parse_document(b"[1, 2, 3]").is_err());
    }

    #[test]
    fn test_relationship_shapes() {
        let doc = parse_document(
            br#"{
                "data": [{
                    "type": "prediction",
                    "id": "p1",
                    "attributes": {"arrival_time": "2024-01-01T10:15:00-05:00", "direction_id": 1},
                    "relationships": {
                        "vehicle": {"data": null},
                        "stop": {"data": {"type": "stop", "id": "place-sstat"}},
                        "alerts": {"data": [{"type": "alert", "id": "a1"}]}
                    }
                }]
            }"#,
        )
        .unwrap();

        let p = &doc.data[0];
        assert_eq!(p.related_id("vehicle"), None);
        assert_eq!(p.related_id("stop"), Some("place-sstat"));
        assert_eq!(p.related_id("alerts"), None);
        assert_eq!(p.related_id("trip"), None);
        assert_eq!(p.attr_i64("direction_id"), Some(1));
        assert_eq!(p.attr_str("arrival_time"), Some("2024-01-01T10:15:00-05:00"));
    }

    #[test]
    fn test_side_tables_split_by_type() {
        let doc = parse_document(
            br#"{
                "data": [],
                "included": [
                    {"type": "stop", "id": "s1", "attributes": {"name": "Natick Center"}},
                    {"type": "trip", "id": "t1", "attributes": {"name": "508"}},
                    {"type": "route", "id": "CR-Worcester"}
                ]
            }"#,
        )
        .unwrap();
        let tables = SideTables::build(&doc.included);
        assert_eq!(tables.stops.len(), 1);
        assert_eq!(tables.trips.len(), 1);
        assert!(tables.vehicles.is_empty());
        assert_eq!(tables.stops["s1"].attr_str("name"), Some("Natick Center"));
    }
}
