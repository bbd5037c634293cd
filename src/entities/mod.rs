// Graph model
//
// Each emitted object has:
// - A stable identity derived from source identifiers (ids.rs)
// - A schema tag from the fixed vocabulary (crate::schema)
// - Multi-valued properties, immutable once emitted

pub mod ids;
pub mod proxy;

pub use ids::{company_id, parse_date, relationship_id, security_id, slugify, succession_id};
pub use proxy::Entity;
