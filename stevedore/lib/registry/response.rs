use getset::Getters;
use serde::{Deserialize, Serialize};

//--------------------------------------------------------------------------------------------------
// Types
//--------------------------------------------------------------------------------------------------

/// The body of a `GET /v2/<name>/tags/list` response.
#[derive(Debug, Clone, Getters, Serialize, Deserialize)]
#[getset(get = "pub")]
pub struct TagsResponse {
    /// The repository name.
    #[serde(default)]
    name: String,

    /// The tags, absent when the repository has none.
    #[serde(default)]
    tags: Vec<String>,
}

/// One page of the `GET /v2/_catalog` listing.
#[derive(Debug, Clone, Default, Getters, Serialize, Deserialize)]
#[getset(get = "pub")]
pub struct Catalog {
    /// The repository names on this page.
    #[serde(default)]
    repositories: Vec<String>,

    /// The `last` cursor for the next page, when the registry signalled one
    /// via the `Link` header or the body.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    next: Option<String>,
}

//--------------------------------------------------------------------------------------------------
// Methods
//--------------------------------------------------------------------------------------------------

impl TagsResponse {
    /// Consumes the response, returning the tag list.
    pub fn into_tags(self) -> Vec<String> {
        self.tags
    }
}

impl Catalog {
    /// Overrides the next-page cursor.
    pub fn set_next(&mut self, next: Option<String>) {
        self.next = next;
    }
}

//--------------------------------------------------------------------------------------------------
// Tests
//--------------------------------------------------------------------------------------------------
