// 📐 Shape Layer - Schema Validation
// Fixed schema vocabulary for the emitted graph + per-property value checks

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use thiserror::Error;

// ============================================================================
// PROPERTY KINDS
// ============================================================================

/// What a property value has to look like before it is accepted
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PropertyKind {
    /// Free text (status codes, roles, legal forms)
    Text,
    /// Names and aliases
    Name,
    /// Opaque identifiers (BIC, ISIN, registration numbers, raw LEIs)
    Identifier,
    /// Reference to another entity id (`lei-...`)
    Entity,
    /// `YYYY`, `YYYY-MM` or `YYYY-MM-DD`
    Date,
    /// Finite decimal number
    Number,
    /// ISO 17442 LEI: 18 alphanumerics + 2 check digits
    Lei,
}

impl PropertyKind {
    /// Clean and check a raw value. Returns the stored form on success.
    pub fn clean(&self, raw: &str) -> Option<String> {
        let value = raw.trim();
        if value.is_empty() {
            return None;
        }

        let accepted = match self {
            PropertyKind::Text
            | PropertyKind::Name
            | PropertyKind::Identifier
            | PropertyKind::Entity => true,
            PropertyKind::Date => is_date(value),
            PropertyKind::Number => value.parse::<f64>().map(f64::is_finite).unwrap_or(false),
            PropertyKind::Lei => is_lei(value),
        };

        if accepted {
            Some(value.to_string())
        } else {
            None
        }
    }
}

fn is_date(value: &str) -> bool {
    match value.len() {
        4 => value.chars().all(|c| c.is_ascii_digit()),
        7 => NaiveDate::parse_from_str(&format!("{}-01", value), "%Y-%m-%d").is_ok(),
        10 => NaiveDate::parse_from_str(value, "%Y-%m-%d").is_ok(),
        _ => false,
    }
}

fn is_lei(value: &str) -> bool {
    value.len() == 20
        && value.is_ascii()
        && value[..18].chars().all(|c| c.is_ascii_digit() || c.is_ascii_uppercase())
        && value[18..].chars().all(|c| c.is_ascii_digit())
}

// ============================================================================
// PROPERTY ERRORS
// ============================================================================

/// A property value the validation layer refused
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PropertyError {
    #[error("{schema} has no property '{property}'")]
    UnknownProperty { schema: Schema, property: String },

    #[error("{schema}.{property} rejected value '{value}'")]
    InvalidValue {
        schema: Schema,
        property: String,
        value: String,
    },
}

// ============================================================================
// SCHEMA VOCABULARY
// ============================================================================

/// Schema tag of an emitted node or edge
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Schema {
    Company,
    Security,
    Succession,
    Directorship,
    Ownership,
    UnknownLink,
}

const EDGE_COMMON: &[(&str, PropertyKind)] = &[
    ("role", PropertyKind::Text),
    ("status", PropertyKind::Text),
    ("startDate", PropertyKind::Date),
    ("endDate", PropertyKind::Date),
    ("percentage", PropertyKind::Number),
    ("modifiedAt", PropertyKind::Date),
];

const COMPANY: &[(&str, PropertyKind)] = &[
    ("name", PropertyKind::Name),
    ("alias", PropertyKind::Name),
    ("jurisdiction", PropertyKind::Text),
    ("country", PropertyKind::Text),
    ("status", PropertyKind::Text),
    ("incorporationDate", PropertyKind::Date),
    ("registrationNumber", PropertyKind::Identifier),
    ("legalForm", PropertyKind::Text),
    ("modifiedAt", PropertyKind::Date),
    ("swiftBic", PropertyKind::Identifier),
    ("leiCode", PropertyKind::Lei),
];

const SECURITY: &[(&str, PropertyKind)] = &[
    ("isin", PropertyKind::Identifier),
    ("issuer", PropertyKind::Entity),
];

const SUCCESSION: &[(&str, PropertyKind)] = &[
    ("predecessor", PropertyKind::Identifier),
    ("successor", PropertyKind::Entity),
];

const DIRECTORSHIP: &[(&str, PropertyKind)] = &[
    ("organization", PropertyKind::Entity),
    ("director", PropertyKind::Entity),
];

const OWNERSHIP: &[(&str, PropertyKind)] = &[
    ("asset", PropertyKind::Entity),
    ("owner", PropertyKind::Entity),
];

const UNKNOWN_LINK: &[(&str, PropertyKind)] = &[
    ("subject", PropertyKind::Entity),
    ("object", PropertyKind::Entity),
];

impl Schema {
    pub fn name(&self) -> &'static str {
        match self {
            Schema::Company => "Company",
            Schema::Security => "Security",
            Schema::Succession => "Succession",
            Schema::Directorship => "Directorship",
            Schema::Ownership => "Ownership",
            Schema::UnknownLink => "UnknownLink",
        }
    }

    /// Parse a schema tag as written by `name()`
    pub fn from_name(name: &str) -> Option<Schema> {
        match name {
            "Company" => Some(Schema::Company),
            "Security" => Some(Schema::Security),
            "Succession" => Some(Schema::Succession),
            "Directorship" => Some(Schema::Directorship),
            "Ownership" => Some(Schema::Ownership),
            "UnknownLink" => Some(Schema::UnknownLink),
            _ => None,
        }
    }

    /// Edges connect two entities; everything else is a node
    pub fn is_edge(&self) -> bool {
        !matches!(self, Schema::Company | Schema::Security)
    }

    /// Schema-specific properties (edge schemas also accept `EDGE_COMMON`)
    fn own_properties(&self) -> &'static [(&'static str, PropertyKind)] {
        match self {
            Schema::Company => COMPANY,
            Schema::Security => SECURITY,
            Schema::Succession => SUCCESSION,
            Schema::Directorship => DIRECTORSHIP,
            Schema::Ownership => OWNERSHIP,
            Schema::UnknownLink => UNKNOWN_LINK,
        }
    }

    /// Kind of a property, or None when the schema does not carry it
    pub fn property_kind(&self, property: &str) -> Option<PropertyKind> {
        let common: &[(&str, PropertyKind)] = match self {
            Schema::Directorship | Schema::Ownership | Schema::UnknownLink => EDGE_COMMON,
            _ => &[],
        };

        self.own_properties()
            .iter()
            .chain(common.iter())
            .find(|(name, _)| *name == property)
            .map(|(_, kind)| *kind)
    }

    /// Validate a single value for `property`
    ///
    /// Ok(None) means the value was blank and nothing should be stored.
    pub fn check(&self, property: &str, raw: &str) -> Result<Option<String>, PropertyError> {
        let kind = self
            .property_kind(property)
            .ok_or_else(|| PropertyError::UnknownProperty {
                schema: *self,
                property: property.to_string(),
            })?;

        if raw.trim().is_empty() {
            return Ok(None);
        }

        kind.clean(raw)
            .map(Some)
            .ok_or_else(|| PropertyError::InvalidValue {
                schema: *self,
                property: property.to_string(),
                value: raw.to_string(),
            })
    }
}

impl std::fmt::Display for Schema {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_schema_name_roundtrip() {
        for schema in [
            Schema::Company,
            Schema::Security,
            Schema::Succession,
            Schema::Directorship,
            Schema::Ownership,
            Schema::UnknownLink,
        ] {
            assert_eq!(Schema::from_name(schema.name()), Some(schema));
        }
        assert_eq!(Schema::from_name("Person"), None);
    }

    #[test]
    fn test_edge_schemas() {
        assert!(!Schema::Company.is_edge());
        assert!(!Schema::Security.is_edge());
        assert!(Schema::Succession.is_edge());
        assert!(Schema::Ownership.is_edge());
    }

    #[test]
    fn test_edge_common_properties() {
        assert_eq!(Schema::Ownership.property_kind("percentage"), Some(PropertyKind::Number));
        assert_eq!(Schema::Directorship.property_kind("director"), Some(PropertyKind::Entity));
        assert_eq!(Schema::Company.property_kind("percentage"), None);
        assert_eq!(Schema::Succession.property_kind("role"), None);
    }

    #[test]
    fn test_date_kind() {
        assert!(Schema::Company.check("modifiedAt", "2022-05-18").is_ok());
        assert!(Schema::Company.check("modifiedAt", "2022-05").is_ok());
        assert!(Schema::Company.check("modifiedAt", "2022").is_ok());
        assert!(Schema::Company.check("modifiedAt", "2022-13-01").is_err());
        assert!(Schema::Company.check("modifiedAt", "yesterday").is_err());
    }

    #[test]
    fn test_number_kind() {
        assert_eq!(
            Schema::Ownership.check("percentage", " 51.5 ").unwrap(),
            Some("51.5".to_string())
        );
        let err = Schema::Ownership.check("percentage", "most").unwrap_err();
        assert!(matches!(err, PropertyError::InvalidValue { .. }));
    }

    #[test]
    fn test_lei_kind() {
        assert!(Schema::Company.check("leiCode", "5493001KJTIIGC8Y1R12").is_ok());
        assert!(Schema::Company.check("leiCode", "5493001KJTIIGC8Y1R1X").is_err());
        assert!(Schema::Company.check("leiCode", "SHORT").is_err());
    }

    #[test]
    fn test_blank_value_is_not_an_error() {
        assert_eq!(Schema::Company.check("name", "   ").unwrap(), None);
    }

    #[test]
    fn test_unknown_property() {
        let err = Schema::Security.check("name", "x").unwrap_err();
        assert_eq!(
            err,
            PropertyError::UnknownProperty {
                schema: Schema::Security,
                property: "name".to_string()
            }
        );
    }
}
