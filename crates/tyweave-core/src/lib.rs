//! Type-inference core for a Ruby-like language with static types.
//!
//! A program arrives as a [`syntax::Node`] tree. [`TypeInferencer`] lowers
//! it into an arena, walks it once and lets the type-binding graph
//! propagate types until every reachable expression has one. Parsing,
//! desugaring, overload resolution and macro rendering are collaborators
//! supplied through [`Collaborators`].

pub mod ast;
pub mod collab;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod inference;
pub mod syntax;

pub use ast::{Ast, ExprId, ExprKind};
pub use collab::{CallResolver, Collaborators, IdentityNormalizer, MacroBackend, MacroExpander, Normalizer, SourceParser};
pub use config::InferOptions;
pub use dispatch::SimpleDispatch;
pub use error::{FrozenTypeError, InferError, InternalError, Result, SyntaxError, TypeError};
pub use inference::{infer_type, InferredProgram, PhaseStats, Program, TypeInferencer};
pub use syntax::{Location, Node};

pub mod prelude {
    pub use crate::collab::{Collaborators, SourceParser};
    pub use crate::config::InferOptions;
    pub use crate::error::{InferError, Result};
    pub use crate::inference::lattice::{TypeId, TypeKind};
    pub use crate::inference::program::Program;
    pub use crate::inference::type_inference::{infer_type, InferredProgram, TypeInferencer};
    pub use crate::syntax::Node;
}
