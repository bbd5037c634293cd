// GLEIF Graph - Core Library
// Maps GLEIF LEI-CDF and RR-CDF XML into a typed entity graph

pub mod config;
pub mod db;
pub mod entities;
pub mod error;
pub mod export;
pub mod lei;
pub mod pipeline;
pub mod reference;
pub mod relationship;
pub mod schema;
pub mod xml;

// Re-export commonly used types
pub use db::{EntityStore, RunRecord, StoreCounts, setup_database};
pub use entities::{
    Entity,
    company_id, security_id, succession_id, relationship_id, slugify, parse_date,
};
pub use error::{LoaderError, PipelineError, SkipReason, Warning};
pub use export::JsonLinesSink;
pub use lei::{LeiRecordMapper, map_lei_record};
pub use pipeline::{
    EntitySink, FileStats, Mapped, RecordMapper, RecordStream,
    parse_lei_file, parse_rr_file, run_pipeline,
};
pub use reference::{
    CodeMap, DirectoryLocator, LegalForms, ReferenceTables, SourceLocator, TableKind,
};
pub use relationship::{EdgeSpec, RelationshipRecordMapper, edge_spec, map_relationship_record};
pub use schema::{PropertyError, PropertyKind, Schema};
pub use xml::{Element, strip_namespaces};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
