//! # Music School Manager Common Library
//!
//! Shared code for the music school services including:
//! - Error types and sqlx error classification
//! - Configuration loading
//! - Database schema, migrations and repositories
//! - Many-to-many association reconciliation
//! - Pagination and role capability checks

pub mod capability;
pub mod config;
pub mod db;
pub mod error;
pub mod pagination;
pub mod reconcile;

pub use capability::{Access, Principal, Role};
pub use error::{Error, IntegrityKind, Result};
pub use pagination::{PageRequest, PaginatedList};
pub use reconcile::{Candidate, EmptySelection, LinkDelta, LinkStore, Partition, Reconciler};
