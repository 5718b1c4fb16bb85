use std::{fmt, str::FromStr};

use getset::Getters;

use crate::{StevedoreError, StevedoreResult};

//--------------------------------------------------------------------------------------------------
// Constants
//--------------------------------------------------------------------------------------------------

/// The registry endpoint used when a reference does not name one.
pub const DEFAULT_ENDPOINT: &str = "registry-1.docker.io";

/// The namespace prepended to single-segment names on the default endpoint.
pub const DEFAULT_NAMESPACE: &str = "library";

/// The tag used when a reference does not name one.
pub const DEFAULT_TAG: &str = "latest";

/// The `sha256:` digest algorithm prefix.
pub const SHA256_PREFIX: &str = "sha256:";

/// Length of a well-formed `sha256:<64 hex chars>` digest string.
const DIGEST_LENGTH: usize = 71;

//--------------------------------------------------------------------------------------------------
// Types
//--------------------------------------------------------------------------------------------------

/// A parsed image reference: `[endpoint/]name[:tag][@digest]`.
///
/// Parsing is pure string work. The endpoint is a bare `host[:port]` with no
/// scheme; whether the registry speaks https or http is discovered later by
/// probing, not guessed here.
#[derive(Debug, Clone, PartialEq, Eq, Getters)]
#[getset(get = "pub")]
pub struct Reference {
    /// The registry endpoint, `host[:port]`.
    endpoint: String,

    /// The repository name, e.g. `library/alpine`.
    name: String,

    /// The tag, defaulting to `latest`.
    tag: String,

    /// The optional `sha256:<hex>` digest.
    digest: Option<String>,
}

//--------------------------------------------------------------------------------------------------
// Methods
//--------------------------------------------------------------------------------------------------

impl Reference {
    /// Parses an image reference string.
    ///
    /// The first `/`-separated segment is treated as a registry endpoint only
    /// when it contains a `:` or a `.`; otherwise the whole string is a name
    /// on the default endpoint. A single-segment name on the default endpoint
    /// gets the `library/` namespace. A trailing `@sha256:<hex>` digest must
    /// be exactly 71 characters.
    pub fn parse(s: &str) -> StevedoreResult<Self> {
        let s = s.trim();
        if s.is_empty() {
            return Err(StevedoreError::Reference("input string is empty".into()));
        }

        let (rest, digest) = match s.rfind('@') {
            Some(at) => {
                let candidate = &s[at + 1..];
                if candidate.len() != DIGEST_LENGTH || !candidate.starts_with(SHA256_PREFIX) {
                    return Err(StevedoreError::Reference(format!(
                        "invalid digest: {}",
                        candidate
                    )));
                }
                (&s[..at], Some(candidate.to_string()))
            }
            None => (s, None),
        };

        let (endpoint, path) = match rest.split_once('/') {
            Some((first, remainder))
                if (first.contains(':') || first.contains('.')) && !remainder.is_empty() =>
            {
                (first.to_string(), remainder)
            }
            _ => (DEFAULT_ENDPOINT.to_string(), rest),
        };

        let (name_part, tag) = match path.rfind(':') {
            Some(idx) => (&path[..idx], path[idx + 1..].to_string()),
            None => (path, DEFAULT_TAG.to_string()),
        };

        if name_part.is_empty() {
            return Err(StevedoreError::Reference(format!("name is empty: {}", s)));
        }
        if tag.is_empty() {
            return Err(StevedoreError::Reference(format!("tag is empty: {}", s)));
        }

        let name = if endpoint == DEFAULT_ENDPOINT && !name_part.contains('/') {
            format!("{}/{}", DEFAULT_NAMESPACE, name_part)
        } else {
            name_part.to_string()
        };

        Ok(Self {
            endpoint,
            name,
            tag,
            digest,
        })
    }

    /// Creates a reference that only carries an endpoint, for operations
    /// scoped to a registry rather than a repository.
    pub fn for_endpoint(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            name: String::new(),
            tag: DEFAULT_TAG.to_string(),
            digest: None,
        }
    }

    /// The manifest locator: the digest when present, else the tag.
    pub fn locator(&self) -> &str {
        self.digest.as_deref().unwrap_or(&self.tag)
    }

    /// Replaces the digest.
    pub fn set_digest(&mut self, digest: impl Into<String>) {
        self.digest = Some(digest.into());
    }
}

//--------------------------------------------------------------------------------------------------
// Trait Implementations
//--------------------------------------------------------------------------------------------------

impl FromStr for Reference {
    type Err = StevedoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for Reference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}:{}", self.endpoint, self.name, self.tag)?;
        if let Some(digest) = &self.digest {
            write!(f, "@{}", digest)?;
        }
        Ok(())
    }
}

//--------------------------------------------------------------------------------------------------
// Tests
//--------------------------------------------------------------------------------------------------
