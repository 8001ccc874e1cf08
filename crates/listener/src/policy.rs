//! What the listener accepts and where it sends jobs.

use std::collections::BTreeSet;

use pipeline::BranchName;

/// Topic deploy jobs are published to, in the listener's own region and account.
pub const DEFAULT_TOPIC_NAME: &str = "github-webhooks";

/// Filtering rules applied to every webhook call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListenerPolicy {
    /// Branches whose pushes are deployed.
    pub allowed_branches: BTreeSet<String>,
    /// Event type that triggers a deploy.
    pub push_event: String,
    /// Event type answered with a liveness acknowledgement.
    pub ping_event: String,
    pub topic_name: String,
}

impl Default for ListenerPolicy {
    fn default() -> Self {
        Self {
            allowed_branches: ["master", "main", "dev"].map(String::from).into(),
            push_event: "push".to_string(),
            ping_event: "ping".to_string(),
            topic_name: DEFAULT_TOPIC_NAME.to_string(),
        }
    }
}

impl ListenerPolicy {
    /// Replaces the allowed branch set. Blank entries are ignored.
    pub fn with_branches<I, S>(mut self, branches: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.allowed_branches = branches
            .into_iter()
            .map(|b| b.as_ref().trim().to_string())
            .filter(|b| !b.is_empty())
            .collect();
        self
    }

    pub fn allows_branch(&self, branch: &BranchName) -> bool {
        self.allowed_branches.contains(branch.as_str())
    }
}
