use std::fmt;

/// Generates a typed index over `usize`.
///
/// The subsystem refers to everything it owns by dense integer index;
/// distinct newtypes keep an atom index from being confused with, say,
/// an atom-class index at compile time.
macro_rules! define_index {
    ($(#[$doc:meta])* $name:ident) => {
        $(#[$doc])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
        pub struct $name(pub usize);

        impl $name {
            #[inline]
            pub fn index(self) -> usize {
                self.0
            }
        }

        impl From<usize> for $name {
            fn from(ix: usize) -> Self {
                Self(ix)
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

define_index!(
    /// Index of an atom in the subsystem's atom store.
    AtomId
);
define_index!(
    /// Index of a bond in the subsystem's bond store.
    BondId
);
define_index!(
    /// Index of a cluster in the subsystem's cluster store.
    ClusterId
);
define_index!(
    /// Internal index of a body view. Distinct from the host's body index:
    /// only host bodies that carry atoms get a body view.
    BodyId
);
define_index!(
    /// User-chosen slot of an atom class in the class registry.
    AtomClassId
);
define_index!(
    /// User-chosen slot of a charged atom type in the type registry.
    ChargedTypeId
);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn index_round_trips_through_usize() {
        let id = AtomClassId::from(14);
        assert_eq!(id.index(), 14);
        assert_eq!(id, AtomClassId(14));
    }

    #[test]
    fn display_prints_bare_index() {
        assert_eq!(AtomId(7).to_string(), "7");
        assert_eq!(ClusterId(0).to_string(), "0");
    }

    #[test]
    fn ids_order_by_index() {
        assert!(AtomId(1) < AtomId(2));
        assert!(ChargedTypeId(10) > ChargedTypeId(9));
    }
}
