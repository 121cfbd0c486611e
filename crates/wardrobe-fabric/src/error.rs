/// Errors produced by the cascade bus.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FabricError {
    /// A store cannot invalidate itself.
    #[error("cascade link from {0} to itself")]
    SelfLink(String),

    /// The declared link would close a cycle in the cascade graph.
    #[error("cascade link {source_store} -> {target} would create a cycle")]
    CascadeCycle { source_store: String, target: String },
}

/// Convenience alias used throughout the fabric crate.
pub type Result<T> = std::result::Result<T, FabricError>;
