//! Identification record attached to a map instance.
//!
//! Holds the map's unique id, provenance (name, author), creation and last
//! update timestamps and its spatial extent. The record carries no lock of
//! its own: inside a [`SparseMap`](crate::atlas::SparseMap) it sits behind
//! the map's identification mutex.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{MapError, Result};
use crate::geometry::BoundingBox3;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Identification {
    uuid: Uuid,
    name: String,
    author: String,
    created_time: DateTime<Utc>,
    last_update_time: DateTime<Utc>,
    bbox: BoundingBox3,
}

impl Identification {
    /// Fresh record with a random v4 uuid and both timestamps set to now.
    pub fn new() -> Self {
        let now = Utc::now();
        Self {
            uuid: Uuid::new_v4(),
            name: String::new(),
            author: String::new(),
            created_time: now,
            last_update_time: now,
            bbox: BoundingBox3::empty(),
        }
    }

    pub fn set_uuid(&mut self, uuid: Uuid) {
        self.uuid = uuid;
    }

    /// Set the uuid from its canonical string form
    /// (lowercase, hyphenated, e.g. `67e55044-10b1-426f-9247-bb680e5fe0c8`).
    ///
    /// On failure the previous uuid is kept.
    pub fn set_uuid_str(&mut self, uuid: &str) -> Result<()> {
        let parsed = Uuid::try_parse(uuid)
            .map_err(|e| MapError::InvalidFormat(format!("{:?}: {}", uuid, e)))?;
        if parsed.hyphenated().to_string() != uuid {
            return Err(MapError::InvalidFormat(format!(
                "{:?} is not in canonical hyphenated lowercase form",
                uuid
            )));
        }
        self.uuid = parsed;
        Ok(())
    }

    pub fn uuid(&self) -> &Uuid {
        &self.uuid
    }

    pub fn uuid_string(&self) -> String {
        self.uuid.hyphenated().to_string()
    }

    pub fn set_name(&mut self, name: impl Into<String>) {
        self.name = name.into();
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn set_author(&mut self, author: impl Into<String>) {
        self.author = author.into();
    }

    pub fn author(&self) -> &str {
        &self.author
    }

    /// Ordering against `last_update_time` is the caller's responsibility.
    pub fn set_created_time(&mut self, created_time: DateTime<Utc>) {
        self.created_time = created_time;
    }

    pub fn created_time(&self) -> &DateTime<Utc> {
        &self.created_time
    }

    /// Ordering against `created_time` is the caller's responsibility.
    pub fn set_last_update_time(&mut self, update_time: DateTime<Utc>) {
        self.last_update_time = update_time;
    }

    pub fn last_update_time(&self) -> &DateTime<Utc> {
        &self.last_update_time
    }

    /// Advance `last_update_time` to now. Never moves it backwards and never
    /// before `created_time`.
    pub fn touch(&mut self) {
        let now = Utc::now();
        self.last_update_time = now.max(self.last_update_time).max(self.created_time);
    }

    pub fn set_bbox(&mut self, bbox: BoundingBox3) {
        self.bbox = bbox;
    }

    pub fn bbox(&self) -> &BoundingBox3 {
        &self.bbox
    }
}

impl Default for Identification {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use nalgebra::Vector3;

    #[test]
    fn test_uuid_string_roundtrip() {
        let samples = [
            "67e55044-10b1-426f-9247-bb680e5fe0c8",
            "00000000-0000-0000-0000-000000000000",
            "b0515c62-cc81-4600-835c-8acdfedf39b5",
        ];
        let mut ident = Identification::new();
        for s in samples {
            ident.set_uuid_str(s).unwrap();
            assert_eq!(ident.uuid_string(), s);
        }

        for _ in 0..32 {
            let s = Uuid::new_v4().hyphenated().to_string();
            ident.set_uuid_str(&s).unwrap();
            assert_eq!(ident.uuid_string(), s);
        }
    }

    #[test]
    fn test_malformed_uuid_keeps_previous() {
        let mut ident = Identification::new();
        let original = ident.uuid_string();

        for bad in [
            "",
            "not-a-uuid",
            "67e55044-10b1-426f-9247-bb680e5fe0c",
            "67e55044-10b1-426f-9247-bb680e5fe0cz",
            "67E55044-10B1-426F-9247-BB680E5FE0C8",
            "67e5504410b1426f9247bb680e5fe0c8",
        ] {
            let err = ident.set_uuid_str(bad).unwrap_err();
            assert!(matches!(err, MapError::InvalidFormat(_)), "{:?}", bad);
            assert_eq!(ident.uuid_string(), original);
        }
    }

    #[test]
    fn test_fresh_ids_are_unique() {
        let a = Identification::new();
        let b = Identification::new();
        assert_ne!(a.uuid(), b.uuid());
        assert!(a.created_time() <= a.last_update_time());
    }

    #[test]
    fn test_touch_never_goes_backwards() {
        let mut ident = Identification::new();
        let future = Utc::now() + Duration::hours(1);
        ident.set_last_update_time(future);
        ident.touch();
        assert_eq!(*ident.last_update_time(), future);

        let mut ident = Identification::new();
        ident.set_created_time(future);
        ident.touch();
        assert!(ident.created_time() <= ident.last_update_time());
    }

    #[test]
    fn test_setters() {
        let mut ident = Identification::new();
        ident.set_name("lab");
        ident.set_author("mapper");
        ident.set_bbox(BoundingBox3::new(Vector3::zeros(), Vector3::repeat(1.0)));

        assert_eq!(ident.name(), "lab");
        assert_eq!(ident.author(), "mapper");
        assert!(ident.bbox().contains(&Vector3::repeat(0.5)));
    }
}
