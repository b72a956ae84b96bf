//! Static schema tables and their validation.
//!
//! # Responsibility
//! - Own the declared collections and indexes for every deployment profile.
//! - Reject malformed declarations before provisioning starts.
//!
//! # Invariants
//! - Specs are `'static` configuration, never runtime data.
//! - All declared index fields are ascending.

pub mod profiles;
pub mod spec;

pub use profiles::Profile;
pub use spec::{CollectionSpec, Direction, IndexField, IndexSpec, Schema, SchemaError};
