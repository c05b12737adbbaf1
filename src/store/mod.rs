//! Persistence layer: the `Database` trait, its libSQL backend, and
//! versioned migrations.

pub mod libsql_backend;
pub mod migrations;
pub mod traits;

pub use libsql_backend::LibSqlBackend;
pub use traits::{
    ApprovalStatus, CachedDistance, Database, DialogStateRow, KnowledgeCategory, KnowledgeItem,
    RelationshipProfileRow, StoredLocation, TurnRecord, TurnRole,
};
