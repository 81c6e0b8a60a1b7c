//! Failures raised while inferring a program.
//!
//! Every failure aborts the traversal. Chained failures (an assignment
//! rejected by a frozen type, a method body failing while being instantiated)
//! keep their cause in an explicit `inner` field so it can be rendered.

use crate::ast::ExprId;
use crate::inference::graph::NodeId;
use crate::syntax::Location;
use thiserror::Error;

pub type Result<T, E = InferError> = std::result::Result<T, E>;

#[derive(Debug, Clone, Error)]
pub enum InferError {
    #[error(transparent)]
    Syntax(#[from] SyntaxError),
    #[error(transparent)]
    Type(#[from] TypeError),
    #[error(transparent)]
    FrozenType(#[from] FrozenTypeError),
    #[error(transparent)]
    Internal(#[from] InternalError),
}

/// Generated source that did not parse
#[derive(Debug, Clone, Error)]
#[error("{message}")]
pub struct SyntaxError {
    pub message: String,
    pub location: Option<Location>,
}

#[derive(Debug, Clone, Error)]
#[error("{message}")]
pub struct TypeError {
    pub message: String,
    pub node: Option<ExprId>,
    pub location: Option<Location>,
    #[source]
    pub inner: Option<Box<InferError>>,
}

/// A frozen node was asked to take a different type
#[derive(Debug, Clone, Error)]
#[error("type must be {frozen}, not {rejected}")]
pub struct FrozenTypeError {
    pub node: NodeId,
    pub frozen: String,
    pub rejected: String,
    pub location: Option<Location>,
}

/// A broken invariant of the pipeline, never caused by user code
#[derive(Debug, Clone, Error)]
#[error("Bug: {message}")]
pub struct InternalError {
    pub message: String,
    pub location: Option<Location>,
}

impl SyntaxError {
    pub fn new(message: impl Into<String>, location: Option<Location>) -> Self {
        Self {
            message: message.into(),
            location,
        }
    }
}

impl TypeError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            node: None,
            location: None,
            inner: None,
        }
    }

    pub fn at(mut self, node: ExprId, location: Option<Location>) -> Self {
        self.node = Some(node);
        self.location = location;
        self
    }

    pub fn with_inner(mut self, inner: InferError) -> Self {
        self.inner = Some(Box::new(inner));
        self
    }
}

impl InferError {
    pub fn message(&self) -> String {
        self.to_string()
    }

    pub fn location(&self) -> Option<&Location> {
        match self {
            InferError::Syntax(err) => err.location.as_ref(),
            InferError::Type(err) => err.location.as_ref(),
            InferError::FrozenType(err) => err.location.as_ref(),
            InferError::Internal(err) => err.location.as_ref(),
        }
    }

    pub fn inner(&self) -> Option<&InferError> {
        match self {
            InferError::Type(err) => err.inner.as_deref(),
            _ => None,
        }
    }

    /// Innermost cause of a chain of wrapped failures
    pub fn root_cause(&self) -> &InferError {
        let mut current = self;
        while let Some(inner) = current.inner() {
            current = inner;
        }
        current
    }

    pub fn is_internal(&self) -> bool {
        matches!(self, InferError::Internal(_))
    }

    /// Frozen-type failures are raised by the graph, which knows no source
    /// positions; the first enclosing expression fills one in.
    pub fn with_location_fallback(self, location: Option<&Location>) -> Self {
        match self {
            InferError::FrozenType(mut err) if err.location.is_none() => {
                err.location = location.cloned();
                InferError::FrozenType(err)
            }
            other => other,
        }
    }

    /// Human-readable report with the offending source line and every
    /// inner cause.
    pub fn render(&self, source: Option<&str>) -> String {
        let mut out = String::new();
        self.render_into(source, &mut out);
        out
    }

    fn render_into(&self, source: Option<&str>, out: &mut String) {
        match self.location() {
            Some(location) => out.push_str(&format!("Error in {location}: {}\n", self.message())),
            None => out.push_str(&format!("Error: {}\n", self.message())),
        }
        if let (Some(location), Some(source)) = (self.location(), source) {
            let line = (location.line as usize)
                .checked_sub(1)
                .and_then(|index| source.lines().nth(index));
            if let Some(line) = line {
                let column = (location.column as usize).saturating_sub(1);
                out.push_str(&format!("\n{line}\n{}^\n", " ".repeat(column)));
            }
        }
        if let Some(inner) = self.inner() {
            out.push('\n');
            inner.render_into(source, out);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frozen() -> InferError {
        InferError::FrozenType(FrozenTypeError {
            node: NodeId(4),
            frozen: "Int32".into(),
            rejected: "Float64".into(),
            location: None,
        })
    }

    #[test]
    fn test_frozen_message() {
        assert_eq!(frozen().message(), "type must be Int32, not Float64");
    }

    #[test]
    fn test_location_fallback_only_fills_missing() {
        let err = frozen().with_location_fallback(Some(&Location::new(None, 2, 5)));
        assert_eq!(err.location(), Some(&Location::new(None, 2, 5)));
        let err = err.with_location_fallback(Some(&Location::new(None, 9, 9)));
        assert_eq!(err.location(), Some(&Location::new(None, 2, 5)));
    }

    #[test]
    fn test_root_cause_follows_chain() {
        let err: InferError = TypeError::new("assigning to a")
            .with_inner(frozen())
            .into();
        let wrapped: InferError = TypeError::new("instantiating 'foo()'")
            .with_inner(err)
            .into();
        assert!(matches!(wrapped.root_cause(), InferError::FrozenType(_)));
        assert!(!wrapped.is_internal());
    }

    #[test]
    fn test_render_with_source_and_inner() {
        let source = "a = 1\na = 2.5\n";
        let err: InferError = TypeError::new("assigning to a")
            .at(ExprId(3), Some(Location::new(Some("main.tw"), 2, 1)))
            .with_inner(frozen())
            .into();
        insta::assert_snapshot!(err.render(Some(source)), @r"
        Error in main.tw:2:1: assigning to a

        a = 2.5
        ^

        Error: type must be Int32, not Float64
        ");
    }

    #[test]
    fn test_internal_prefix() {
        let err: InferError = InternalError {
            message: "broken".into(),
            location: None,
        }
        .into();
        assert!(err.is_internal());
        assert_eq!(err.to_string(), "Bug: broken");
    }
}
