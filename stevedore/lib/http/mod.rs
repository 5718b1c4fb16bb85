//! HTTP transport with explicit redirect handling and structured registry
//! error decoding.

mod transport;

//--------------------------------------------------------------------------------------------------
// Exports
//--------------------------------------------------------------------------------------------------

pub use transport::*;
