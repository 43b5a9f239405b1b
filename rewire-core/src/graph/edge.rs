//! Edge representation for undirected multigraphs.
//!
//! Edges are unordered node pairs stored in canonical form (`u <= v`) so that
//! lexicographic comparison doubles as multiset equality. A reserved sentinel
//! stands in for "no edge" in message channels that need placeholders.

use std::fmt;

use crate::em::Record;

/// Node identifier. The persisted edge format is two little-endian signed
/// 64-bit node ids, so the in-memory type matches.
pub type Node = i64;

/// An undirected edge in canonical form.
///
/// # Examples
/// ```
/// use rewire_core::Edge;
///
/// let e = Edge::new(7, 3);
/// assert_eq!((e.u(), e.v()), (3, 7));
/// assert!(!e.is_loop());
/// assert!(Edge::new(1, 1).is_loop());
/// ```
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Edge {
    u: Node,
    v: Node,
}

impl Edge {
    /// The "no edge" sentinel. Sorts before every canonical edge.
    pub const INVALID: Edge = Edge { u: -1, v: -1 };

    /// Creates an edge, ordering the endpoints canonically.
    #[must_use]
    pub fn new(a: Node, b: Node) -> Self {
        if a <= b {
            Self { u: a, v: b }
        } else {
            Self { u: b, v: a }
        }
    }

    /// Creates an edge from already-ordered endpoints without reordering.
    ///
    /// Used when decoding persisted data, where a violation must be detected
    /// rather than repaired; see [`Edge::is_canonical`].
    #[must_use]
    pub const fn from_raw(u: Node, v: Node) -> Self {
        Self { u, v }
    }

    /// Returns the smaller endpoint.
    #[must_use]
    #[rustfmt::skip]
    pub const fn u(&self) -> Node { self.u }

    /// Returns the larger endpoint.
    #[must_use]
    #[rustfmt::skip]
    pub const fn v(&self) -> Node { self.v }

    /// Returns `true` when the endpoints are ordered `u <= v`.
    #[must_use]
    pub const fn is_canonical(&self) -> bool {
        self.u <= self.v
    }

    /// Returns `true` for the reserved sentinel.
    #[must_use]
    pub fn is_invalid(&self) -> bool {
        *self == Self::INVALID
    }

    /// Returns `true` when both endpoints coincide.
    #[must_use]
    pub const fn is_loop(&self) -> bool {
        self.u == self.v
    }

    /// Performs the double-edge swap of `self` and `other`.
    ///
    /// With `direction = false` the smaller endpoints pair up
    /// (`(a0,b0), (a1,b1)`); with `direction = true` they cross
    /// (`(a0,b1), (a1,b0)`). Both outputs are canonicalised.
    ///
    /// # Examples
    /// ```
    /// use rewire_core::Edge;
    ///
    /// let (x, y) = Edge::new(1, 3).swap_with(Edge::new(2, 4), true);
    /// assert_eq!((x, y), (Edge::new(1, 4), Edge::new(2, 3)));
    /// ```
    #[must_use]
    pub fn swap_with(&self, other: Edge, direction: bool) -> (Edge, Edge) {
        if direction {
            (Edge::new(self.u, other.v), Edge::new(self.v, other.u))
        } else {
            (Edge::new(self.u, other.u), Edge::new(self.v, other.v))
        }
    }
}

impl fmt::Display for Edge {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.u, self.v)
    }
}

impl Record for Edge {
    const BYTES: usize = 16;

    fn write_bytes(&self, out: &mut [u8]) {
        out[..8].copy_from_slice(&self.u.to_le_bytes());
        out[8..16].copy_from_slice(&self.v.to_le_bytes());
    }

    fn read_bytes(buf: &[u8]) -> Self {
        let u = i64::from_le_bytes(buf[..8].try_into().expect("eight bytes"));
        let v = i64::from_le_bytes(buf[8..16].try_into().expect("eight bytes"));
        Self { u, v }
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::{Edge, Record};

    #[rstest]
    #[case(3, 7, (3, 7))]
    #[case(7, 3, (3, 7))]
    #[case(5, 5, (5, 5))]
    fn new_orders_endpoints(#[case] a: i64, #[case] b: i64, #[case] expected: (i64, i64)) {
        let e = Edge::new(a, b);
        assert_eq!((e.u(), e.v()), expected);
        assert!(e.is_canonical());
    }

    #[test]
    fn invalid_sentinel_sorts_first() {
        assert!(Edge::INVALID < Edge::new(0, 0));
        assert!(Edge::INVALID.is_invalid());
        assert!(!Edge::new(0, 1).is_invalid());
    }

    #[rstest]
    #[case(Edge::new(1, 3), Edge::new(2, 4), false, Edge::new(1, 2), Edge::new(3, 4))]
    #[case(Edge::new(1, 3), Edge::new(2, 4), true, Edge::new(1, 4), Edge::new(2, 3))]
    #[case(Edge::new(2, 3), Edge::new(2, 4), false, Edge::new(2, 2), Edge::new(3, 4))]
    fn swap_with_pairs_endpoints(
        #[case] a: Edge,
        #[case] b: Edge,
        #[case] direction: bool,
        #[case] first: Edge,
        #[case] second: Edge,
    ) {
        assert_eq!(a.swap_with(b, direction), (first, second));
    }

    #[test]
    fn codec_round_trips() {
        let mut buf = [0u8; Edge::BYTES];
        for e in [Edge::new(-4, 9), Edge::INVALID, Edge::new(0, i64::MAX)] {
            e.write_bytes(&mut buf);
            assert_eq!(Edge::read_bytes(&buf), e);
        }
    }
}
