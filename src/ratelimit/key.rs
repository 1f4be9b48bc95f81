//! Keys for in-process rate windows.

/// A key that uniquely identifies a burst window.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct WindowKey {
    /// The user or client address the window belongs to
    pub subject: String,
    /// The operation being limited
    pub operation: String,
}

impl WindowKey {
    /// Create a new window key.
    pub fn new(subject: &str, operation: &str) -> Self {
        Self {
            subject: subject.to_string(),
            operation: operation.to_string(),
        }
    }
}

impl std::fmt::Display for WindowKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.subject, self.operation)
    }
}
