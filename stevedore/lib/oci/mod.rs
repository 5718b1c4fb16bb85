//! OCI data model: image references, media types, manifests, blobs, and the
//! unified in-memory image the archive and registry layers exchange.

mod blob;
mod image;
mod manifest;
mod media_type;
mod reference;

//--------------------------------------------------------------------------------------------------
// Exports
//--------------------------------------------------------------------------------------------------

pub use blob::*;
pub use image::*;
pub use manifest::*;
pub use media_type::*;
pub use reference::*;
