//! Distribution API operations and their wire response bodies.

mod api;
mod response;

//--------------------------------------------------------------------------------------------------
// Exports
//--------------------------------------------------------------------------------------------------

pub use api::*;
pub use response::*;
