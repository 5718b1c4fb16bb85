//! `stevedore` is a client library for OCI/Docker Distribution registries.
//!
//! # Overview
//!
//! stevedore moves container images between local tarballs and remote
//! registries without a daemon or runtime in the way. It handles:
//! - Token and basic authentication, including Docker Hub's token flow
//! - Manifest and blob operations of the Distribution HTTP API
//! - Reading `docker save` and OCI image-layout tarballs
//! - Writing pulled images back out as `docker save` tarballs
//!
//! # Usage Example
//!
//! ```rust,no_run
//! use std::path::Path;
//! use stevedore::RegistryClient;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let client = RegistryClient::new()?;
//!     client.auth_basic("localhost:5000", "user", "pass")?;
//!
//!     // Push a docker-save tarball, then copy it within the registry.
//!     client.push(Path::new("alpine.tar"), "localhost:5000/myrepo:1.0").await?;
//!     client.copy("localhost:5000/myrepo:1.0", "localhost:5000/other:1.0").await?;
//!
//!     // Pull it back down.
//!     client.pull("localhost:5000/other:1.0", Path::new("other.tar")).await?;
//!
//!     Ok(())
//! }
//! ```
//!
//! # Modules
//!
//! - [`archive`] - Tarball reading and writing
//! - [`auth`] - Credentials and token exchange
//! - [`http`] - Redirect-aware transport
//! - [`oci`] - References, manifests, blobs, and the unified image form
//! - [`registry`] - Distribution API operations

#![warn(missing_docs)]

mod client;
mod error;

//--------------------------------------------------------------------------------------------------
// Exports
//--------------------------------------------------------------------------------------------------

pub mod archive;
pub mod auth;
pub mod http;
pub mod oci;
pub mod registry;

pub use client::*;
pub use error::*;
