// 🧩 Entity - one node or edge of the emitted graph
//
// "Identity is the id, values are the property set"
//
// - id is derived from source identifiers only (see ids.rs), never random
// - properties are multi-valued and collapse duplicates by value
// - BTree collections keep serialization and fingerprints deterministic

use crate::schema::{PropertyError, Schema};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::{BTreeMap, BTreeSet};

// ============================================================================
// ENTITY
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Entity {
    /// Stable identity, e.g. `lei-5493001KJTIIGC8Y1R12`
    pub id: String,

    /// Schema tag from the fixed vocabulary
    pub schema: Schema,

    /// property name → values
    #[serde(default)]
    properties: BTreeMap<String, BTreeSet<String>>,
}

impl Entity {
    pub fn new(schema: Schema, id: impl Into<String>) -> Self {
        Entity {
            id: id.into(),
            schema,
            properties: BTreeMap::new(),
        }
    }

    /// Add a validated value
    ///
    /// Blank or absent values are a no-op. Unknown properties and values
    /// the schema rejects come back as `PropertyError` and are not stored.
    pub fn add(&mut self, property: &str, value: Option<&str>) -> Result<(), PropertyError> {
        let Some(raw) = value else {
            return Ok(());
        };

        if let Some(clean) = self.schema.check(property, raw)? {
            self.insert(property, clean);
        }
        Ok(())
    }

    /// Add a value without running the kind check
    ///
    /// The property must still exist on the schema.
    pub fn add_unchecked(&mut self, property: &str, value: &str) -> Result<(), PropertyError> {
        if self.schema.property_kind(property).is_none() {
            return Err(PropertyError::UnknownProperty {
                schema: self.schema,
                property: property.to_string(),
            });
        }

        let value = value.trim();
        if !value.is_empty() {
            self.insert(property, value.to_string());
        }
        Ok(())
    }

    fn insert(&mut self, property: &str, value: String) {
        self.properties
            .entry(property.to_string())
            .or_default()
            .insert(value);
    }

    /// All values of a property
    pub fn get(&self, property: &str) -> Option<&BTreeSet<String>> {
        self.properties.get(property)
    }

    /// First value of a property (in sort order)
    pub fn first(&self, property: &str) -> Option<&str> {
        self.properties
            .get(property)
            .and_then(|values| values.iter().next())
            .map(String::as_str)
    }

    pub fn has(&self, property: &str) -> bool {
        self.properties.contains_key(property)
    }

    pub fn properties(&self) -> &BTreeMap<String, BTreeSet<String>> {
        &self.properties
    }

    /// Union another fragment of the same entity into this one
    pub fn merge(&mut self, other: &Entity) {
        for (property, values) in &other.properties {
            self.properties
                .entry(property.clone())
                .or_default()
                .extend(values.iter().cloned());
        }
    }

    /// SHA-256 over schema, id and the sorted property set
    ///
    /// Identical input gives an identical fingerprint; the store uses it to
    /// tell unchanged rows from updated ones.
    pub fn fingerprint(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.schema.name().as_bytes());
        hasher.update([0u8]);
        hasher.update(self.id.as_bytes());
        for (property, values) in &self.properties {
            for value in values {
                hasher.update([0u8]);
                hasher.update(property.as_bytes());
                hasher.update([b'=']);
                hasher.update(value.as_bytes());
            }
        }
        format!("{:x}", hasher.finalize())
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_add_collapses_duplicates() {
        let mut company = Entity::new(Schema::Company, "lei-X");
        company.add("name", Some("Example AG")).unwrap();
        company.add("name", Some(" Example AG ")).unwrap();
        company.add("name", Some("Example Aktiengesellschaft")).unwrap();

        assert_eq!(company.get("name").unwrap().len(), 2);
        assert_eq!(company.first("name"), Some("Example AG"));
    }

    #[test]
    fn test_add_none_and_blank_are_noops() {
        let mut company = Entity::new(Schema::Company, "lei-X");
        company.add("status", None).unwrap();
        company.add("status", Some("")).unwrap();

        assert!(!company.has("status"));
        assert!(company.properties().is_empty());
    }

    #[test]
    fn test_add_rejects_invalid_value() {
        let mut ownership = Entity::new(Schema::Ownership, "lei-A-x-B");
        let result = ownership.add("percentage", Some("n/a"));

        assert!(result.is_err());
        assert!(!ownership.has("percentage"));
    }

    #[test]
    fn test_add_unchecked_skips_kind_check() {
        let mut company = Entity::new(Schema::Company, "lei-bad");
        assert!(company.add("leiCode", Some("bad")).is_err());
        company.add_unchecked("leiCode", "bad").unwrap();

        assert_eq!(company.first("leiCode"), Some("bad"));
        assert!(company.add_unchecked("isin", "X").is_err());
    }

    #[test]
    fn test_fingerprint_is_order_independent() {
        let mut a = Entity::new(Schema::Company, "lei-X");
        a.add("name", Some("One")).unwrap();
        a.add("alias", Some("Two")).unwrap();

        let mut b = Entity::new(Schema::Company, "lei-X");
        b.add("alias", Some("Two")).unwrap();
        b.add("name", Some("One")).unwrap();

        assert_eq!(a.fingerprint(), b.fingerprint());

        b.add("status", Some("ACTIVE")).unwrap();
        assert_ne!(a.fingerprint(), b.fingerprint());
    }

    #[test]
    fn test_merge_unions_values() {
        let mut a = Entity::new(Schema::Security, "lei-isin-US0000000001");
        a.add("issuer", Some("lei-A")).unwrap();
        let mut b = Entity::new(Schema::Security, "lei-isin-US0000000001");
        b.add("issuer", Some("lei-B")).unwrap();
        b.add("isin", Some("US0000000001")).unwrap();

        a.merge(&b);
        assert_eq!(a.get("issuer").unwrap().len(), 2);
        assert!(a.has("isin"));
    }

    #[test]
    fn test_serialize_shape() {
        let mut company = Entity::new(Schema::Company, "lei-X");
        company.add("name", Some("Example AG")).unwrap();

        let json = serde_json::to_value(&company).unwrap();
        assert_eq!(json["id"], "lei-X");
        assert_eq!(json["schema"], "Company");
        assert_eq!(json["properties"]["name"][0], "Example AG");

        let back: Entity = serde_json::from_value(json).unwrap();
        assert_eq!(back, company);
    }
}
