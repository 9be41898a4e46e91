//! Turning parsed keys into per-account records
//!
//! Keys are grouped by the local part of their email, then folded together with
//! whatever is already authorized on accounts that exist on the host.

mod aggregate;
mod models;
mod reconcile;

pub use models::{UserRecord, default_shell};
pub use reconcile::collect_users;
