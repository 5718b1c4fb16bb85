//--------------------------------------------------------------------------------------------------
// Types
//--------------------------------------------------------------------------------------------------

/// The repository actions a token is requested for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Scope {
    /// No repository scope, e.g. for the catalog endpoint.
    None,

    /// Read access.
    Pull,

    /// Read and write access.
    PullPush,

    /// Delete access.
    Delete,
}

//--------------------------------------------------------------------------------------------------
// Methods
//--------------------------------------------------------------------------------------------------

impl Scope {
    /// The action list as it appears in a token scope parameter.
    pub fn as_str(&self) -> &'static str {
        match self {
            Scope::None => "",
            Scope::Pull => "pull",
            Scope::PullPush => "pull,push",
            Scope::Delete => "delete",
        }
    }
}

//--------------------------------------------------------------------------------------------------
// Tests
//--------------------------------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scope_wire_strings() {
        assert_eq!(Scope::None.as_str(), "");
        assert_eq!(Scope::Pull.as_str(), "pull");
        assert_eq!(Scope::PullPush.as_str(), "pull,push");
        assert_eq!(Scope::Delete.as_str(), "delete");
    }
}
