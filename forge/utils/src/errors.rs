//! Errors generated by the scheduling passes.
use crate::Id;
use thiserror::Error;

/// Convenience wrapper to represent success or meaningful compiler error.
pub type ForgeResult<T> = std::result::Result<T, Error>;

/// Errors generated by the compiler. The kind is boxed so that results stay
/// one pointer wide.
pub struct Error {
    kind: Box<ErrorKind>,
    /// Name of the node the error was reported against, if any.
    node: Option<Id>,
}

/// Standard error type for the passes.
#[derive(Error, Debug)]
pub enum ErrorKind {
    /// A structural property of the design graph does not hold.
    #[error("invariant violation: {0}")]
    InvariantViolation(String),
    /// A node kind reached a pass that never handles it.
    #[error("[{pass}] unexpected node `{node}': {msg}")]
    UnexpectedNode { pass: Id, node: Id, msg: String },
    /// A feature of the input cannot be expressed in hardware.
    #[error("unsupported: {0}")]
    Unsupported(String),
    /// The assumption of a pass was violated.
    #[error("[{pass}] assumption violated: {msg}")]
    PassAssumption { pass: Id, msg: String },
    /// Miscellaneous error message.
    #[error("{0}")]
    Misc(String),
}

impl Error {
    fn with_kind(kind: ErrorKind) -> Self {
        Self {
            kind: Box::new(kind),
            node: None,
        }
    }

    pub fn invariant<S: ToString>(msg: S) -> Self {
        Self::with_kind(ErrorKind::InvariantViolation(msg.to_string()))
    }

    pub fn unexpected_node<P, S>(pass: P, node: Id, msg: S) -> Self
    where
        P: Into<Id>,
        S: ToString,
    {
        Self::with_kind(ErrorKind::UnexpectedNode {
            pass: pass.into(),
            node,
            msg: msg.to_string(),
        })
        .with_node(node)
    }

    pub fn unsupported<S: ToString>(msg: S) -> Self {
        Self::with_kind(ErrorKind::Unsupported(msg.to_string()))
    }

    pub fn pass_assumption<P, S>(pass: P, msg: S) -> Self
    where
        P: Into<Id>,
        S: ToString,
    {
        Self::with_kind(ErrorKind::PassAssumption {
            pass: pass.into(),
            msg: msg.to_string(),
        })
    }

    pub fn misc<S: ToString>(msg: S) -> Self {
        Self::with_kind(ErrorKind::Misc(msg.to_string()))
    }

    /// Attach the name of the offending node.
    pub fn with_node(mut self, node: Id) -> Self {
        self.node = Some(node);
        self
    }

    pub fn kind(&self) -> &ErrorKind {
        &self.kind
    }

    pub fn node(&self) -> Option<Id> {
        self.node
    }

    pub fn message(&self) -> String {
        self.kind.to_string()
    }
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.node {
            Some(node) if !matches!(*self.kind, ErrorKind::UnexpectedNode { .. }) => {
                write!(f, "{} (at `{node}')", self.kind)
            }
            _ => write!(f, "{}", self.kind),
        }
    }
}

impl std::fmt::Debug for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        std::fmt::Display::fmt(self, f)
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&*self.kind)
    }
}

impl From<ErrorKind> for Error {
    fn from(kind: ErrorKind) -> Self {
        Self::with_kind(kind)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn node_is_reported() {
        let err = Error::invariant("entry has no dependencies")
            .with_node(Id::from("add0"));
        assert_eq!(
            err.to_string(),
            "invariant violation: entry has no dependencies (at `add0')"
        );
        assert!(matches!(err.kind(), ErrorKind::InvariantViolation(_)));
    }

    #[test]
    fn unexpected_node_names_pass() {
        let err = Error::unexpected_node(
            "global-connector",
            Id::from("pin_read3"),
            "deprecated pin access",
        );
        assert_eq!(
            err.to_string(),
            "[global-connector] unexpected node `pin_read3': deprecated pin access"
        );
        assert_eq!(err.node(), Some(Id::from("pin_read3")));
    }
}
