//! Event-subscription bitmask.

use std::ops::{BitAnd, BitOr, BitOrAssign};

use serde::{Deserialize, Serialize};

/// Bitmask of event categories a client wants the server to push.
///
/// Sent in Identify and Reidentify. The server only delivers events whose
/// category bit is set. The bit layout is defined by the server; this type
/// treats it as an opaque `u32` with set algebra.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EventSubscriptions(u32);

impl EventSubscriptions {
    /// Subscribe to nothing.
    pub const NONE: Self = Self(0);
    /// Subscribe to every category.
    pub const ALL: Self = Self(u32::MAX);

    /// Construct from a raw bitmask.
    #[must_use]
    pub const fn from_bits(bits: u32) -> Self {
        Self(bits)
    }

    /// The raw bitmask.
    #[must_use]
    pub const fn bits(self) -> u32 {
        self.0
    }

    /// Whether every bit in `other` is set in `self`.
    #[must_use]
    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    /// Whether no bits are set.
    #[must_use]
    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }
}

impl BitOr for EventSubscriptions {
    type Output = Self;
    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

impl BitOrAssign for EventSubscriptions {
    fn bitor_assign(&mut self, rhs: Self) {
        self.0 |= rhs.0;
    }
}

impl BitAnd for EventSubscriptions {
    type Output = Self;
    fn bitand(self, rhs: Self) -> Self {
        Self(self.0 & rhs.0)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn none_is_empty() {
        assert!(EventSubscriptions::NONE.is_empty());
        assert!(!EventSubscriptions::ALL.is_empty());
    }

    #[test]
    fn all_contains_everything() {
        let some = EventSubscriptions::from_bits(0b1010);
        assert!(EventSubscriptions::ALL.contains(some));
        assert!(!some.contains(EventSubscriptions::ALL));
    }

    #[test]
    fn or_combines_bits() {
        let a = EventSubscriptions::from_bits(0b01);
        let b = EventSubscriptions::from_bits(0b10);
        assert_eq!((a | b).bits(), 0b11);
    }

    #[test]
    fn or_assign() {
        let mut mask = EventSubscriptions::NONE;
        mask |= EventSubscriptions::from_bits(0b100);
        assert_eq!(mask.bits(), 0b100);
    }

    #[test]
    fn and_intersects_bits() {
        let a = EventSubscriptions::from_bits(0b110);
        let b = EventSubscriptions::from_bits(0b011);
        assert_eq!((a & b).bits(), 0b010);
    }

    #[test]
    fn serde_is_transparent_integer() {
        let mask = EventSubscriptions::from_bits(33);
        assert_eq!(serde_json::to_string(&mask).unwrap(), "33");
        let back: EventSubscriptions = serde_json::from_str("33").unwrap();
        assert_eq!(back, mask);
    }

    #[test]
    fn default_is_none() {
        assert_eq!(EventSubscriptions::default(), EventSubscriptions::NONE);
    }

    proptest! {
        #[test]
        fn union_contains_both_operands(a in any::<u32>(), b in any::<u32>()) {
            let a = EventSubscriptions::from_bits(a);
            let b = EventSubscriptions::from_bits(b);
            let union = a | b;
            prop_assert!(union.contains(a));
            prop_assert!(union.contains(b));
        }

        #[test]
        fn intersection_is_contained_in_both(a in any::<u32>(), b in any::<u32>()) {
            let a = EventSubscriptions::from_bits(a);
            let b = EventSubscriptions::from_bits(b);
            let both = a & b;
            prop_assert!(a.contains(both));
            prop_assert!(b.contains(both));
        }
    }
}
