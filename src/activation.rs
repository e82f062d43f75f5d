//! Classifies the segment overlap counts produced by
//! [`Connections::compute_activity`](crate::connections::Connections::compute_activity)
//! into active and matching segment sets.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::connections::{CellIndex, Connections, SegmentId};

/// The raw overlap counts for one compute step, keyed by segment.
///
/// A segment absent from both maps had zero active presynaptic cells; the
/// accessors treat a missing entry as `0` rather than requiring callers to
/// special-case it.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct SegmentActivity {
    connected: HashMap<SegmentId, u32>,
    potential: HashMap<SegmentId, u32>,
}

impl SegmentActivity {
    /// Build from the two maps returned by `compute_activity`.
    pub fn new(connected: HashMap<SegmentId, u32>, potential: HashMap<SegmentId, u32>) -> Self {
        Self { connected, potential }
    }

    /// Count of synapses from active cells with permanence at or above the
    /// connected-permanence threshold.
    #[inline]
    pub fn connected_overlap(&self, segment: SegmentId) -> u32 {
        *self.connected.get(&segment).unwrap_or(&0)
    }

    /// Count of synapses from active cells regardless of permanence.
    #[inline]
    pub fn potential_overlap(&self, segment: SegmentId) -> u32 {
        *self.potential.get(&segment).unwrap_or(&0)
    }

    /// All segments that have a nonzero potential overlap this step.
    pub fn touched_segments(&self) -> impl Iterator<Item = SegmentId> + '_ {
        self.potential.keys().copied()
    }
}

/// A `(cell, segment)` pair identifying one classified segment, kept
/// together since every consumer of an active/matching segment list needs
/// both -- the owning cell (to decide which column/cell becomes active or
/// predictive) and the segment ID (to look up or mutate it).
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub struct ActiveSegment {
    /// Cell the segment is grown on.
    pub cell: CellIndex,
    /// The segment's ID in the owning `Connections` arena.
    pub segment: SegmentId,
}

/// Classify every touched segment as active (`connected_overlap >=
/// active_threshold`) and/or matching (`potential_overlap >=
/// min_threshold`), returning both lists sorted by `(cell, segment)` for
/// deterministic iteration order downstream.
pub fn classify_segments(
    connections: &Connections,
    activity: &SegmentActivity,
    active_threshold: u32,
    min_threshold: u32,
) -> (Vec<ActiveSegment>, Vec<ActiveSegment>) {
    let mut active = Vec::new();
    let mut matching = Vec::new();

    for segment in activity.touched_segments() {
        let Ok(data) = connections.data_for_segment(segment) else {
            continue;
        };
        let entry = ActiveSegment {
            cell: data.cell,
            segment,
        };

        if activity.connected_overlap(segment) >= active_threshold {
            active.push(entry);
        }
        if activity.potential_overlap(segment) >= min_threshold {
            matching.push(entry);
        }
    }

    active.sort();
    matching.sort();
    (active, matching)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connections::ConnectionsLimits;

    fn unlimited() -> ConnectionsLimits {
        ConnectionsLimits {
            max_segments_per_cell: None,
            max_synapses_per_segment: None,
        }
    }

    #[test]
    fn test_classify_active_and_matching() {
        let mut conns = Connections::new(unlimited());
        let seg_active = conns.create_segment(0, 0);
        conns.create_synapse(seg_active, 1, 0.8).unwrap();
        conns.create_synapse(seg_active, 2, 0.8).unwrap();

        let seg_matching_only = conns.create_segment(1, 0);
        conns.create_synapse(seg_matching_only, 1, 0.1).unwrap();
        conns.create_synapse(seg_matching_only, 2, 0.1).unwrap();

        let (connected, potential) = conns.compute_activity(&[1, 2], 0.5);
        let activity = SegmentActivity::new(connected, potential);

        let (active, matching) = classify_segments(&conns, &activity, 2, 2);

        assert_eq!(active, vec![ActiveSegment { cell: 0, segment: seg_active }]);
        assert_eq!(matching.len(), 2);
    }

    #[test]
    fn test_untouched_segments_are_absent() {
        let mut conns = Connections::new(unlimited());
        let seg = conns.create_segment(0, 0);
        conns.create_synapse(seg, 1, 0.9).unwrap();

        let (connected, potential) = conns.compute_activity(&[], 0.5);
        let activity = SegmentActivity::new(connected, potential);
        assert_eq!(activity.potential_overlap(seg), 0);
        assert_eq!(activity.connected_overlap(seg), 0);
    }
}
