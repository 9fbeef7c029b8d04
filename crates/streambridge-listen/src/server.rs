//! The server block being configured.

/// One server section of the configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerBlock {
    /// Name used to tag the endpoints this block owns.
    pub name: String,

    /// Set as soon as any listener is requested for this block. A block
    /// without explicit listeners may get a default one synthesized.
    pub has_listen: bool,
}

impl ServerBlock {
    /// A block with no listeners yet.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            has_listen: false,
        }
    }
}
