//! Alias registry on top of the ledger
//!
//! This module provides:
//! - Resolution of names to the keys bound to them
//! - The advisory uniqueness check run before registering
//! - The registration flow from claim to mined, propagated record
//! - The pluggable naming policy

pub mod policy;
pub mod registration;
pub mod resolver;
pub mod uniqueness;

pub use policy::{AliasPolicy, DefaultAliasPolicy, ValidationError, MAX_ALIAS_LENGTH};
pub use registration::{
    Aborted, Claim, Registrar, Registration, RegistrationError, RegistrationState,
};
pub use resolver::{
    find_alias, get_alias_for_key, get_public_key, get_record, list_aliases, AliasEntry,
    AliasIter, ResolveError,
};
pub use uniqueness::{UniquenessChecker, UniquenessError};
