// 🔗 Relationship Mapper - RelationshipRecord → typed edge
//
// The relationship type code picks the edge schema and the two role
// properties from a closed vocabulary. New codes are added to VOCABULARY
// only; anything not listed is skipped with a warning.

use crate::entities::{company_id, parse_date, relationship_id, Entity};
use crate::error::{SkipReason, Warning};
use crate::pipeline::{Mapped, RecordMapper};
use crate::schema::Schema;
use crate::xml::Element;

pub const RR_NAMESPACE: &str = "http://www.gleif.org/data/schema/rr/2016";
pub const RR_RECORD_TAG: &str = "RelationshipRecord";

/// Only LEI-keyed endpoints are resolved
pub const LEI_NODE_ID_TYPE: &str = "LEI";
/// PeriodType of the overall relationship period
pub const RELATIONSHIP_PERIOD: &str = "RELATIONSHIP_PERIOD";
pub const PERCENTAGE_UNITS: &str = "PERCENTAGE";

// ============================================================================
// VOCABULARY
// ============================================================================

/// Target schema of a relationship type and its role property names
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EdgeSpec {
    pub schema: Schema,
    /// Property holding the StartNode company id
    pub start_role: &'static str,
    /// Property holding the EndNode company id
    pub end_role: &'static str,
}

const DIRECTORSHIP: EdgeSpec = EdgeSpec {
    schema: Schema::Directorship,
    start_role: "organization",
    end_role: "director",
};

const OWNERSHIP: EdgeSpec = EdgeSpec {
    schema: Schema::Ownership,
    start_role: "asset",
    end_role: "owner",
};

const UNKNOWN_LINK: EdgeSpec = EdgeSpec {
    schema: Schema::UnknownLink,
    start_role: "subject",
    end_role: "object",
};

pub const VOCABULARY: &[(&str, EdgeSpec)] = &[
    ("IS_FUND-MANAGED_BY", DIRECTORSHIP),
    ("IS_SUBFUND_OF", DIRECTORSHIP),
    ("IS_DIRECTLY_CONSOLIDATED_BY", OWNERSHIP),
    ("IS_ULTIMATELY_CONSOLIDATED_BY", OWNERSHIP),
    ("IS_INTERNATIONAL_BRANCH_OF", OWNERSHIP),
    ("IS_FEEDER_TO", UNKNOWN_LINK),
];

/// Edge spec for a relationship type code
pub fn edge_spec(relationship_type: &str) -> Option<&'static EdgeSpec> {
    VOCABULARY
        .iter()
        .find(|(code, _)| *code == relationship_type)
        .map(|(_, spec)| spec)
}

// ============================================================================
// MAPPER
// ============================================================================

/// RecordMapper for RR-CDF files
pub struct RelationshipRecordMapper;

impl RecordMapper for RelationshipRecordMapper {
    fn record_tag(&self) -> &'static str {
        RR_RECORD_TAG
    }

    fn namespace(&self) -> &'static str {
        RR_NAMESPACE
    }

    fn map(&self, record: &Element) -> Result<Mapped, SkipReason> {
        map_relationship_record(record)
    }

    fn record_key(&self, record: &Element) -> Option<String> {
        let start = record.findtext("Relationship/StartNode/NodeID")?;
        let end = record.findtext("Relationship/EndNode/NodeID").unwrap_or("?");
        Some(format!("{}->{}", start, end))
    }
}

/// Map one namespace-free RelationshipRecord to at most one edge
pub fn map_relationship_record(record: &Element) -> Result<Mapped, SkipReason> {
    let relationship = record
        .child("Relationship")
        .ok_or(SkipReason::MissingRelationship)?;

    let relationship_type = relationship
        .findtext("RelationshipType")
        .ok_or(SkipReason::MissingRelationshipType)?;
    let spec = edge_spec(relationship_type)
        .ok_or_else(|| SkipReason::UnknownRelationshipType(relationship_type.to_string()))?;

    let start_lei = node_lei(relationship, "StartNode")?;
    let end_lei = node_lei(relationship, "EndNode")?;

    let mut out = Mapped::default();
    let mut edge = Entity::new(
        spec.schema,
        relationship_id(start_lei, relationship_type, end_lei),
    );

    out.add(&mut edge, spec.start_role, Some(company_id(start_lei).as_str()));
    out.add(&mut edge, spec.end_role, Some(company_id(end_lei).as_str()));
    out.add(&mut edge, "role", Some(relationship_type.replace('_', " ").as_str()));
    out.add(&mut edge, "status", relationship.findtext("RelationshipStatus"));

    for period in relationship.find_all("RelationshipPeriods/RelationshipPeriod") {
        if period.findtext("PeriodType") != Some(RELATIONSHIP_PERIOD) {
            continue;
        }
        let start = parse_date(period.findtext("StartDate"));
        let end = parse_date(period.findtext("EndDate"));
        out.add(&mut edge, "startDate", start.as_deref());
        out.add(&mut edge, "endDate", end.as_deref());
    }

    for quantifier in relationship.find_all("RelationshipQuantifiers/RelationshipQuantifier") {
        match quantifier.findtext("QuantifierUnits") {
            None | Some(PERCENTAGE_UNITS) => {
                out.add(&mut edge, "percentage", quantifier.findtext("QuantifierAmount"));
            }
            Some(units) => out.warnings.push(Warning::QuantifierUnits {
                units: units.to_string(),
            }),
        }
    }

    let modified = parse_date(record.findtext("Registration/LastUpdateDate"));
    out.add(&mut edge, "modifiedAt", modified.as_deref());

    out.entities.push(edge);
    Ok(out)
}

/// LEI of a StartNode/EndNode; other id schemes are out of scope
fn node_lei<'a>(relationship: &'a Element, node: &'static str) -> Result<&'a str, SkipReason> {
    let element = relationship
        .child(node)
        .ok_or(SkipReason::MissingNode(node))?;

    match element.findtext("NodeIDType") {
        Some(LEI_NODE_ID_TYPE) => {}
        other => {
            return Err(SkipReason::UnsupportedNodeIdType {
                node,
                id_type: other.unwrap_or("none").to_string(),
            })
        }
    }

    element.findtext("NodeID").ok_or(SkipReason::MissingNode(node))
}

// ============================================================================
// TESTS
// ============================================================================
