// ⚠️ Error taxonomy
//
// - PipelineError: file-level, aborts the run
// - LoaderError:   reference-table level, the caller decides whether to abort
// - SkipReason:    record-level, the record is dropped and the run continues

use crate::reference::TableKind;
use crate::schema::PropertyError;
use thiserror::Error;

/// Fatal condition for a whole input file
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("malformed XML at byte {position}: {message}")]
    Xml { position: u64, message: String },

    #[error("no usable <{tag}> records in input")]
    NoRecords { tag: &'static str },

    #[error("sink rejected entity {id}: {message}")]
    Sink { id: String, message: String },
}

/// Fatal condition for one reference table
#[derive(Debug, Error)]
pub enum LoaderError {
    #[error("no source found for {table} table in {location}")]
    SourceNotFound { table: TableKind, location: String },

    #[error("{table} table has no '{column}' column")]
    MissingColumn { table: TableKind, column: &'static str },

    #[error("{table} table row {line} has no LEI")]
    MissingLei { table: TableKind, line: u64 },

    #[error("CSV error in {table} table: {source}")]
    Csv {
        table: TableKind,
        #[source]
        source: csv::Error,
    },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Why a single record produced no entities
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SkipReason {
    #[error("record has no LEI")]
    MissingLei,

    #[error("record has no Entity element")]
    MissingEntity,

    #[error("record has no Relationship element")]
    MissingRelationship,

    #[error("relationship has no RelationshipType")]
    MissingRelationshipType,

    #[error("unknown relationship type {0}")]
    UnknownRelationshipType(String),

    #[error("relationship has no {0}")]
    MissingNode(&'static str),

    #[error("{node} id type {id_type} is not LEI")]
    UnsupportedNodeIdType { node: &'static str, id_type: String },
}

impl SkipReason {
    /// Short stable label used for per-file skip counters
    pub fn label(&self) -> &'static str {
        match self {
            SkipReason::MissingLei => "missing_lei",
            SkipReason::MissingEntity => "missing_entity",
            SkipReason::MissingRelationship => "missing_relationship",
            SkipReason::MissingRelationshipType => "missing_relationship_type",
            SkipReason::UnknownRelationshipType(_) => "unknown_relationship_type",
            SkipReason::MissingNode(_) => "missing_node",
            SkipReason::UnsupportedNodeIdType { .. } => "unsupported_node_id_type",
        }
    }
}

/// Something dropped from a record that was otherwise mapped
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Warning {
    #[error("quantifier with units {units} is not a percentage, dropped")]
    QuantifierUnits { units: String },

    #[error("successor of {lei} has no SuccessorLEI, succession dropped")]
    SuccessorWithoutLei { lei: String },

    #[error(transparent)]
    Property(#[from] PropertyError),
}
