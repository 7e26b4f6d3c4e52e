//! Database schema, repositories and link stores

pub mod init;
pub mod instruments;
pub mod migrations;
pub mod musicians;
pub mod performances;
pub mod plays;
pub mod reports;
pub mod songs;
pub mod users;

pub use init::{init_database, init_in_memory, init_schema, seed_bootstrap_user};
pub use plays::PlayLinks;
pub use users::{UserManager, UserRoleLinks};
