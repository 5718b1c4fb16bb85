//! Credential storage and bearer token exchange for registry operations.

mod authenticator;
mod cache;
mod scope;

//--------------------------------------------------------------------------------------------------
// Exports
//--------------------------------------------------------------------------------------------------

pub use authenticator::*;
pub use cache::*;
pub use scope::*;
