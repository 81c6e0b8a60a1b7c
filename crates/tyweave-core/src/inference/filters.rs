//! Flow-sensitive narrowing.
//!
//! A filter never changes a variable's stored type. Reads inside a guarded
//! region are bound through a filtering node instead, so the narrowed view
//! follows the variable as its type keeps changing.

use crate::inference::lattice::{TypeId, TypeKind, TypeTable};
use indexmap::IndexMap;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TypeFilter {
    /// Removes `Nil` from the type
    NotNil,
    /// Keeps only what is a `T` (from `is_a?(T)`)
    Simple(TypeId),
    And(Vec<TypeFilter>),
}

impl TypeFilter {
    /// Narrowed view of `ty`, or `None` when nothing survives
    pub fn apply(&self, types: &mut TypeTable, ty: TypeId) -> Option<TypeId> {
        match self {
            TypeFilter::NotNil => {
                let nil = types.builtins().nil;
                match types.kind(ty) {
                    TypeKind::Union(members) => {
                        let kept: Vec<TypeId> = members.iter().copied().filter(|m| *m != nil).collect();
                        types.merge(&kept)
                    }
                    _ if ty == nil => None,
                    _ => Some(ty),
                }
            }
            TypeFilter::Simple(target) => match types.kind(ty) {
                TypeKind::Union(members) => {
                    let kept: Vec<TypeId> = members
                        .iter()
                        .copied()
                        .filter(|m| types.is_subtype(*m, *target))
                        .collect();
                    types.merge(&kept)
                }
                _ if types.is_subtype(ty, *target) => Some(ty),
                _ if types.is_subtype(*target, ty) => Some(*target),
                _ => None,
            },
            TypeFilter::And(filters) => filters
                .iter()
                .try_fold(ty, |current, filter| filter.apply(types, current)),
        }
    }

    fn and(self, other: TypeFilter) -> TypeFilter {
        if self == other {
            return self;
        }
        let mut parts = match self {
            TypeFilter::And(parts) => parts,
            single => vec![single],
        };
        match other {
            TypeFilter::And(more) => parts.extend(more),
            single => parts.push(single),
        }
        TypeFilter::And(parts)
    }
}

/// Filters a guard proves, keyed by variable name
pub type FilterMap = IndexMap<String, TypeFilter>;

pub fn not_nil(name: &str) -> FilterMap {
    let mut map = FilterMap::new();
    map.insert(name.to_string(), TypeFilter::NotNil);
    map
}

/// Filters holding when both guards hold
pub fn and_filters(left: Option<&FilterMap>, right: Option<&FilterMap>) -> Option<FilterMap> {
    match (left, right) {
        (None, None) => None,
        (Some(only), None) | (None, Some(only)) => Some(only.clone()),
        (Some(left), Some(right)) => {
            let mut merged = left.clone();
            for (name, filter) in right {
                let combined = match merged.shift_remove(name) {
                    Some(existing) => existing.and(filter.clone()),
                    None => filter.clone(),
                };
                merged.insert(name.clone(), combined);
            }
            Some(merged)
        }
    }
}

/// Disjunction of filters is not supported: code guarded by `||` gets no
/// narrowing at all.
pub fn or_filters(_left: Option<&FilterMap>, _right: Option<&FilterMap>) -> Option<FilterMap> {
    None
}

/// Scoped stack of filter frames, innermost last
#[derive(Debug, Clone)]
pub struct FilterStack {
    frames: Vec<FilterMap>,
}

impl Default for FilterStack {
    fn default() -> Self {
        Self::new()
    }
}

impl FilterStack {
    pub fn new() -> Self {
        Self {
            frames: vec![FilterMap::new()],
        }
    }

    pub fn push(&mut self, frame: FilterMap) {
        self.frames.push(frame);
    }

    pub fn pop(&mut self) -> Option<FilterMap> {
        self.frames.pop()
    }

    pub fn depth(&self) -> usize {
        self.frames.len()
    }

    /// Conjunction of every active filter for `name`
    pub fn build_filter(&self, name: &str) -> Option<TypeFilter> {
        self.frames
            .iter()
            .rev()
            .filter_map(|frame| frame.get(name).cloned())
            .reduce(TypeFilter::and)
    }

    /// Make `filters` hold for the rest of the current frame
    pub fn reassert(&mut self, filters: &FilterMap) {
        let Some(top) = self.frames.last_mut() else {
            self.frames.push(filters.clone());
            return;
        };
        if let Some(merged) = and_filters(Some(top), Some(filters)) {
            *top = merged;
        }
    }
}
