//! Tarball codec: reads docker-save and OCI image-layout archives into the
//! unified image form and writes images back out as docker-save tarballs.

mod codec;
mod hash;

//--------------------------------------------------------------------------------------------------
// Exports
//--------------------------------------------------------------------------------------------------

pub use codec::*;
pub use hash::*;
