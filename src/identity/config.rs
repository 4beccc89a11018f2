/// Tunables for [`crate::identity::tracker::IdentityTracker`].
///
/// Mirrors [`crate::graph::GraphConfig`]'s habit of a small, directly
/// constructed config struct rather than scattered constants.
#[derive(Debug, Clone)]
pub struct TrackerConfig {
    /// Page size used when enumerating `USER` nodes for
    /// `getConnectionGraph`. The first page is the only one consulted
    /// (spec.md §9 open question); this bounds how many users a single
    /// call can surface.
    pub user_page_size: usize,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            user_page_size: 500,
        }
    }
}
