//! Typed handles into the [Design](crate::Design) arena.
use forge_idx::impl_index;

macro_rules! define_idx {
    ($($(#[$attr:meta])* $name:ident),* $(,)?) => {
        $(
            $(#[$attr])*
            #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
            #[cfg_attr(feature = "serialize", derive(serde::Serialize))]
            pub struct $name(u32);
            impl_index!($name);
        )*
    };
}

define_idx!(
    /// A component (primitive or module).
    CompIdx,
    /// An input port.
    PortIdx,
    /// An output bus.
    BusIdx,
    /// A completion point of a component.
    ExitIdx,
    /// One activation context of a component.
    EntryIdx,
    /// A shared register or memory port.
    ResourceIdx,
    /// A top-level entry point.
    TaskIdx,
);
