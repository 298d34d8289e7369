//! Entity trait: identity + continuity across reads.

/// Entity marker + minimal interface.
///
/// Categories are entities rather than aggregates: they are created once and
/// never receive commands afterwards.
pub trait Entity {
    /// Strongly-typed entity identifier.
    type Id: Clone + Eq + core::hash::Hash + core::fmt::Debug;

    /// Returns the entity identifier.
    fn id(&self) -> &Self::Id;
}
