use stratum_core::DEFAULT_MAX_HIERARCHY_DEPTH;

/// Settings shared by the validator and the chain builder.
#[derive(Debug, Clone)]
pub struct PkiConfig {
    /// Upper bound on CAs visited by any hierarchy walk. Reaching it is
    /// treated as a corrupt hierarchy.
    pub max_hierarchy_depth: usize,
}

impl Default for PkiConfig {
    fn default() -> Self {
        Self {
            max_hierarchy_depth: DEFAULT_MAX_HIERARCHY_DEPTH,
        }
    }
}
