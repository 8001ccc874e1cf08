//! Newtype domain identifiers.
//!
//! Every domain concept that has an identity is represented as a distinct newtype
//! wrapping a primitive. This prevents accidentally interchanging — for example —
//! a [`RepositoryOwner`] with a [`BucketName`] even though both are strings under
//! the hood.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ---------------------------------------------------------------------------
// Macro for String-wrapped newtypes.
// Generates: struct, new() returning Option<Self>, as_str(), Display, and
// serde conversions that apply the same non-empty rule.
// ---------------------------------------------------------------------------
macro_rules! string_id {
    (
        $(#[$attr:meta])*
        $name:ident
    ) => {
        $(#[$attr])*
        #[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(try_from = "String", into = "String")]
        pub struct $name(String);

        impl $name {
            /// Creates a new identifier, returning `None` if the value is empty.
            pub fn new(value: impl Into<String>) -> Option<Self> {
                let v = value.into();
                if v.is_empty() { None } else { Some(Self(v)) }
            }

            /// Returns the identifier as a string slice.
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        // Deserialization goes through `new`, so empty strings are refused.
        impl TryFrom<String> for $name {
            type Error = String;

            fn try_from(value: String) -> Result<Self, Self::Error> {
                Self::new(value).ok_or_else(|| format!("{} must not be empty", stringify!($name)))
            }
        }

        impl From<$name> for String {
            fn from(id: $name) -> String {
                id.0
            }
        }
    };
}

// ---------------------------------------------------------------------------
// Identifiers — String-backed (source control)
// ---------------------------------------------------------------------------

string_id! {
    /// The user or organisation that owns a source repository.
    RepositoryOwner
}

string_id! {
    /// The name of a source repository, without its owner.
    RepositoryName
}

string_id! {
    /// A Git branch name (e.g. `"main"`, `"dev"`).
    BranchName
}

/// Prefix carried by every branch ref in a push notification.
pub const BRANCH_REF_PREFIX: &str = "refs/heads/";

string_id! {
    /// A fully-qualified Git reference as pushed (e.g. `"refs/heads/dev"`).
    GitRef
}

impl GitRef {
    /// Builds the ref that points at `branch`.
    pub fn for_branch(branch: &BranchName) -> Self {
        Self(format!("{BRANCH_REF_PREFIX}{branch}"))
    }

    /// Returns the branch name this ref points at.
    ///
    /// `None` for anything that is not a `refs/heads/` ref (tags, notes) or
    /// for the bare prefix.
    pub fn branch(&self) -> Option<BranchName> {
        self.0
            .strip_prefix(BRANCH_REF_PREFIX)
            .and_then(BranchName::new)
    }
}

// ---------------------------------------------------------------------------
// Identifiers — String-backed (deploy targets and hosting)
// ---------------------------------------------------------------------------

string_id! {
    /// An object-storage bucket that receives a branch's deployed tree.
    BucketName
}

string_id! {
    /// A key within an object-storage bucket, always `/`-separated and
    /// relative to the bucket root.
    ObjectKey
}

string_id! {
    /// The name under which the current function is deployed.
    ///
    /// Recorded on every error record so failures can be traced back to the
    /// component that produced them.
    FunctionName
}

// ---------------------------------------------------------------------------
// Identifiers — UUID-backed (internally generated)
// ---------------------------------------------------------------------------

/// Identifies a single invocation of the listener or the deployer.
///
/// Generated fresh for every inbound event; used to name the deployer's
/// scratch namespace and propagated through spans so all activity from one
/// invocation can be correlated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct InvocationId(Uuid);

impl InvocationId {
    /// Generates a new random invocation identifier.
    pub fn new_random() -> Self {
        Self(Uuid::new_v4())
    }

    /// Creates an [`InvocationId`] from an existing UUID (e.g. a host-supplied request id).
    pub fn from_uuid(id: Uuid) -> Self {
        Self(id)
    }

    /// Returns the underlying [`Uuid`].
    pub fn as_uuid(self) -> Uuid {
        self.0
    }
}

impl std::fmt::Display for InvocationId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}
