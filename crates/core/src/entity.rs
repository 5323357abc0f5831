//! Entity traits: identity plus the source/target naming every dimension row carries.

/// Entity marker + minimal interface.
pub trait Entity {
    /// Strongly-typed entity identifier.
    type Id: Clone + Eq + core::hash::Hash + core::fmt::Debug;

    /// Returns the entity identifier.
    fn id(&self) -> &Self::Id;
}

/// A dimension row known under a source-system name and, optionally, under a
/// target name in the billing system.
pub trait Named: Entity {
    /// Name in the system the usage was collected from.
    fn source(&self) -> &str;

    /// Name in the billing system, if mapped.
    fn target(&self) -> Option<&str>;

    /// `true` when the row has no usable billing identity.
    fn missing_target(&self) -> bool {
        self.target().is_none_or(str::is_empty)
    }
}
