//! SeaORM entity model for the `auditlog` table.
//!
//! The table is created from this entity when a store file is opened, so the
//! struct is the single schema definition.

use sea_orm::entity::prelude::*;

/// One row per saved audit entry.
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
#[sea_orm(table_name = "auditlog")]
pub struct Model {
    /// Auto-increment row id
    #[sea_orm(primary_key)]
    pub id: i32,
    /// Fixed-width RFC3339 UTC timestamp, lexicographically ordered
    #[sea_orm(indexed)]
    pub timestamp: String,
    pub username: String,
    pub remote_ip: String,
    /// e.g. "client", "client.tunnel"
    pub application: String,
    /// e.g. "create", "delete"
    pub action: String,
    /// Identifier of the affected object
    pub affected_id: String,
    pub client_id: String,
    pub client_hostname: String,
    /// JSON-encoded request payload
    pub request: String,
    /// JSON-encoded response payload
    pub response: String,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
