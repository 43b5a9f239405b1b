//! Message records exchanged between engine phases.
//!
//! Every message sorts by its destination key; the derived (or hand-written)
//! `Ord` of each type IS the sorter comparator it travels under, so changing
//! field order here changes the dataflow.

use std::fmt;

use crate::{
    em::Record,
    graph::{Edge, EdgeId, SwapId},
};

/// One side of one swap, packed as `swap_id << 1 | side`.
///
/// The packed order makes "side 0 before side 1 of the same swap, earlier
/// swaps before later ones" a plain integer comparison, which is the global
/// evaluation order of the engine.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SideKey(u64);

impl SideKey {
    /// Packs a swap id and a side (0 or 1).
    #[must_use]
    pub fn new(swap: SwapId, side: usize) -> Self {
        debug_assert!(side < 2);
        Self(swap.get() << 1 | side as u64)
    }

    /// Returns the swap id.
    #[must_use]
    pub const fn swap_id(self) -> SwapId {
        SwapId::new(self.0 >> 1)
    }

    /// Returns the side (0 or 1).
    #[must_use]
    pub const fn side(self) -> usize {
        (self.0 & 1) as usize
    }
}

impl fmt::Display for SideKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "S{}E{}", self.swap_id(), self.side())
    }
}

impl Record for SideKey {
    const BYTES: usize = 8;

    fn write_bytes(&self, out: &mut [u8]) {
        out[..8].copy_from_slice(&self.0.to_le_bytes());
    }

    fn read_bytes(buf: &[u8]) -> Self {
        Self(u64::from_le_bytes(buf[..8].try_into().expect("eight bytes")))
    }
}

/// Load request produced per swap side, matched against the edge sequence in
/// one joint pass. Sorted by edge position, then by destination key.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub struct EdgeLoadRequest {
    /// Position of the requested edge.
    pub edge_id: EdgeId,
    /// The swap side that reads it.
    pub key: SideKey,
}

impl Record for EdgeLoadRequest {
    const BYTES: usize = 16;

    fn write_bytes(&self, out: &mut [u8]) {
        out[..8].copy_from_slice(&self.edge_id.get().to_le_bytes());
        self.key.write_bytes(&mut out[8..16]);
    }

    fn read_bytes(buf: &[u8]) -> Self {
        Self {
            edge_id: EdgeId::new(u64::from_le_bytes(buf[..8].try_into().expect("eight bytes"))),
            key: SideKey::read_bytes(&buf[8..16]),
        }
    }
}

/// A possible source configuration of one swap side.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub struct EdgeStateMsg {
    /// Destination swap side.
    pub key: SideKey,
    /// One edge the side may hold when its swap executes.
    pub edge: Edge,
}

impl Record for EdgeStateMsg {
    const BYTES: usize = 24;

    fn write_bytes(&self, out: &mut [u8]) {
        self.key.write_bytes(&mut out[..8]);
        self.edge.write_bytes(&mut out[8..24]);
    }

    fn read_bytes(buf: &[u8]) -> Self {
        Self {
            key: SideKey::read_bytes(&buf[..8]),
            edge: Edge::read_bytes(&buf[8..24]),
        }
    }
}

/// Links a swap side to the next side reading the same edge position.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub struct SuccessorMsg {
    /// The earlier side.
    pub key: SideKey,
    /// The next side to receive the earlier side's configurations.
    pub successor: SideKey,
}

impl Record for SuccessorMsg {
    const BYTES: usize = 16;

    fn write_bytes(&self, out: &mut [u8]) {
        self.key.write_bytes(&mut out[..8]);
        self.successor.write_bytes(&mut out[8..16]);
    }

    fn read_bytes(buf: &[u8]) -> Self {
        Self {
            key: SideKey::read_bytes(&buf[..8]),
            successor: SideKey::read_bytes(&buf[8..16]),
        }
    }
}

/// Asks whether `edge` exists in the graph when `swap` executes.
///
/// Requests group by edge, and within one edge the LATEST swap sorts first;
/// the request processor walks each group from latest to earliest while
/// accumulating the notification chain, and that walk direction is load
/// bearing. `source_edge` requests only forward state (the side already holds
/// the edge); at equal `(edge, swap)` a genuine query outranks them.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ExistenceRequest {
    /// The queried edge.
    pub edge: Edge,
    /// The requesting swap.
    pub swap: SwapId,
    /// `true` when `edge` is one of the swap's source edges.
    pub source_edge: bool,
}

impl Ord for ExistenceRequest {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.edge
            .cmp(&other.edge)
            .then_with(|| other.swap.cmp(&self.swap))
            .then_with(|| self.source_edge.cmp(&other.source_edge))
    }
}

impl PartialOrd for ExistenceRequest {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Record for ExistenceRequest {
    const BYTES: usize = 25;

    fn write_bytes(&self, out: &mut [u8]) {
        self.edge.write_bytes(&mut out[..16]);
        out[16..24].copy_from_slice(&self.swap.get().to_le_bytes());
        out[24] = u8::from(self.source_edge);
    }

    fn read_bytes(buf: &[u8]) -> Self {
        Self {
            edge: Edge::read_bytes(&buf[..16]),
            swap: SwapId::read_bytes(&buf[16..24]),
            source_edge: buf[24] != 0,
        }
    }
}

/// Tells `swap` how many copies of `edge` the graph state reaching it holds.
///
/// A zero count is a counted "does not exist" outcome, so the receiver's
/// placeholder arithmetic still balances. Carrying the multiplicity rather
/// than a boolean keeps parallel edges honest: a swap that consumes one copy
/// of a doubled edge forwards count one, not absence.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub struct ExistenceInfoMsg {
    /// Destination swap.
    pub swap: SwapId,
    /// The edge in question.
    pub edge: Edge,
    /// Multiplicity of the edge; zero means absent.
    pub count: u64,
}

impl Record for ExistenceInfoMsg {
    const BYTES: usize = 32;

    fn write_bytes(&self, out: &mut [u8]) {
        out[..8].copy_from_slice(&self.swap.get().to_le_bytes());
        self.edge.write_bytes(&mut out[8..24]);
        out[24..32].copy_from_slice(&self.count.to_le_bytes());
    }

    fn read_bytes(buf: &[u8]) -> Self {
        Self {
            swap: SwapId::read_bytes(&buf[..8]),
            edge: Edge::read_bytes(&buf[8..24]),
            count: u64::from_le_bytes(buf[24..32].try_into().expect("eight bytes")),
        }
    }
}

/// Tells `swap` to forward the fate of `edge` to `successor` once known.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub struct ExistenceSuccessorMsg {
    /// The swap that determines the edge's fate.
    pub swap: SwapId,
    /// The edge in question.
    pub edge: Edge,
    /// The later swap awaiting the outcome.
    pub successor: SwapId,
}

impl Record for ExistenceSuccessorMsg {
    const BYTES: usize = 32;

    fn write_bytes(&self, out: &mut [u8]) {
        out[..8].copy_from_slice(&self.swap.get().to_le_bytes());
        self.edge.write_bytes(&mut out[8..24]);
        out[24..32].copy_from_slice(&self.successor.get().to_le_bytes());
    }

    fn read_bytes(buf: &[u8]) -> Self {
        Self {
            swap: SwapId::read_bytes(&buf[..8]),
            edge: Edge::read_bytes(&buf[8..24]),
            successor: SwapId::read_bytes(&buf[24..32]),
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::graph::{Edge, SwapId};

    use super::{ExistenceRequest, SideKey};

    #[test]
    fn side_key_orders_sides_within_swaps() {
        let a0 = SideKey::new(SwapId::new(3), 0);
        let a1 = SideKey::new(SwapId::new(3), 1);
        let b0 = SideKey::new(SwapId::new(4), 0);
        assert!(a0 < a1 && a1 < b0);
        assert_eq!(a1.swap_id(), SwapId::new(3));
        assert_eq!(a1.side(), 1);
    }

    #[test]
    fn existence_requests_sort_latest_swap_first_within_edge() {
        let early = ExistenceRequest {
            edge: Edge::new(1, 2),
            swap: SwapId::new(1),
            source_edge: false,
        };
        let late = ExistenceRequest {
            edge: Edge::new(1, 2),
            swap: SwapId::new(7),
            source_edge: false,
        };
        let other_edge = ExistenceRequest {
            edge: Edge::new(1, 3),
            swap: SwapId::new(0),
            source_edge: false,
        };
        assert!(late < early, "later swaps come first within an edge group");
        assert!(early < other_edge, "edge order dominates");

        let source = ExistenceRequest {
            source_edge: true,
            ..early
        };
        assert!(early < source, "queries outrank source-only requests");
    }
}
