//! Type inference.
//!
//! - [`lattice`]: the type table, unions, metaclasses and generic instances
//! - [`graph`]: typed nodes and the bindings that propagate types between them
//! - [`filters`]: flow-sensitive narrowing of local variables
//! - [`program`]: the session owning everything above
//! - [`visitor`]: the traversal driver
//! - [`type_inference`]: the whole-program entry point

pub mod filters;
pub mod graph;
pub mod lattice;
mod macros;
pub mod program;
pub mod type_inference;
pub mod visitor;

pub use filters::{FilterMap, FilterStack, TypeFilter};
pub use graph::{NodeId, Observer, TypeGraph, TypeMapping};
pub use lattice::{Builtins, LatticeError, NamedEntry, TypeId, TypeKind, TypeTable};
pub use program::Program;
pub use type_inference::{infer_type, InferredProgram, PhaseStats, TypeInferencer};
pub use visitor::{TypeVisitor, VisitContext};
