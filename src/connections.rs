//! Arena-backed dendrite/synapse graph and the engine's deterministic random
//! source.
//!
//! `Connections` owns every [`Segment`](SegmentData) and
//! [`Synapse`](SynapseData) in the engine as a flat, capacity-bounded arena
//! addressed by stable integer IDs. An inverted index from presynaptic cell
//! to synapse keeps overlap computation (`compute_activity`) proportional to
//! the number of active cells' outgoing synapses rather than the total
//! synapse count.

use std::collections::HashMap;

use log::{debug, trace};
use serde::{Deserialize, Serialize};

use crate::error::{Result, TmError};

/// Global index of a cell (`column * cellsPerColumn + cellOffset`).
pub type CellIndex = u32;

/// Stable ID of a segment within a [`Connections`] arena.
pub type SegmentId = u32;

/// Stable ID of a synapse within a [`Connections`] arena.
pub type SynapseId = u32;

/// A deterministic, seedable pseudo-random source used for every
/// tie-breaking and sampling decision the engine makes.
///
/// This is a xorshift64star generator rather than a dependency on the `rand`
/// crate's `StdRng`: it is four `u64` operations, trivially
/// `Serialize`/`Deserialize`, and its output sequence is guaranteed stable
/// across platforms and crate versions -- all properties a snapshot
/// round-trip depends on.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RandomSource {
    seed: u64,
    state: u64,
}

impl RandomSource {
    /// Create a new random source from a seed.
    ///
    /// A seed of `0` is remapped internally (xorshift requires nonzero
    /// state); the returned generator is still fully determined by `seed`.
    pub fn new(seed: u64) -> Self {
        let state = if seed == 0 { 0x9E3779B97F4A7C15 } else { seed };
        Self { seed, state }
    }

    /// The seed this generator was constructed with.
    #[inline]
    pub fn seed(&self) -> u64 {
        self.seed
    }

    /// Advance the generator and return the next raw `u64`.
    pub fn next_u64(&mut self) -> u64 {
        let mut x = self.state;
        x ^= x >> 12;
        x ^= x << 25;
        x ^= x >> 27;
        self.state = x;
        x.wrapping_mul(0x2545F4914F6CDD1D)
    }

    /// Return a random index in `0..len` (panics if `len == 0`).
    pub fn next_index(&mut self, len: usize) -> usize {
        debug_assert!(len > 0);
        (self.next_u64() % len as u64) as usize
    }
}

/// A copy of the public state of one segment, returned by value (mirrors the
/// original implementation's `dataForSegment`, which never hands out live
/// references into the arena).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SegmentData {
    /// The cell this segment is grown on.
    pub cell: CellIndex,
    /// The compute step at which this segment was last part of an active or
    /// matching segment set; used for LRU eviction.
    pub last_used: u64,
}

/// A copy of the public state of one synapse.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SynapseData {
    /// The segment this synapse belongs to.
    pub segment: SegmentId,
    /// The presynaptic cell this synapse reads activity from.
    pub presynaptic_cell: CellIndex,
    /// Current permanence in `[0.0, 1.0]`.
    pub permanence: f32,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
struct SegmentRecord {
    cell: CellIndex,
    last_used: u64,
    synapses: Vec<SynapseId>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
struct SynapseRecord {
    segment: SegmentId,
    presynaptic_cell: CellIndex,
    permanence: f32,
}

/// Capacity bounds applied to every cell/segment as new segments and
/// synapses are created. `None` means unbounded.
#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize)]
pub struct ConnectionsLimits {
    /// Maximum live segments per cell before the least-recently-used segment
    /// is evicted to make room.
    pub max_segments_per_cell: Option<usize>,
    /// Maximum live synapses per segment before the weakest-permanence
    /// synapse is recycled in place to make room.
    pub max_synapses_per_segment: Option<usize>,
}

/// The dendritic-segment/synapse graph.
///
/// Segments and synapses are stored in flat arenas indexed by
/// [`SegmentId`]/[`SynapseId`]; destroyed entries leave a `None` hole that is
/// reused by later `create_*` calls via a free-list, so IDs are stable for
/// the lifetime of the entry but not permanently unique across the arena's
/// history.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Connections {
    segments: Vec<Option<SegmentRecord>>,
    segment_free_list: Vec<SegmentId>,
    synapses: Vec<Option<SynapseRecord>>,
    synapse_free_list: Vec<SynapseId>,
    cell_segments: HashMap<CellIndex, Vec<SegmentId>>,
    presyn_index: HashMap<CellIndex, Vec<SynapseId>>,
    limits: ConnectionsLimits,
    num_segments: usize,
    num_synapses: usize,
}

impl Connections {
    /// Create an empty graph with the given capacity limits.
    pub fn new(limits: ConnectionsLimits) -> Self {
        Self {
            segments: Vec::new(),
            segment_free_list: Vec::new(),
            synapses: Vec::new(),
            synapse_free_list: Vec::new(),
            cell_segments: HashMap::new(),
            presyn_index: HashMap::new(),
            limits,
            num_segments: 0,
            num_synapses: 0,
        }
    }

    /// Number of live segments in the graph.
    #[inline]
    pub fn num_segments(&self) -> usize {
        self.num_segments
    }

    /// Number of live synapses in the graph.
    #[inline]
    pub fn num_synapses(&self) -> usize {
        self.num_synapses
    }

    /// Number of live segments in the graph grown on `cell`.
    pub fn num_segments_on_cell(&self, cell: CellIndex) -> usize {
        self.cell_segments.get(&cell).map_or(0, Vec::len)
    }

    /// List the live segments grown on `cell`, in creation order.
    pub fn segments_for_cell(&self, cell: CellIndex) -> &[SegmentId] {
        self.cell_segments
            .get(&cell)
            .map_or(&[][..], |v| v.as_slice())
    }

    /// List the live synapses on `segment`, in creation order.
    pub fn synapses_for_segment(&self, segment: SegmentId) -> Result<&[SynapseId]> {
        self.record(segment).map(|r| r.synapses.as_slice())
    }

    /// Copy out the public data for `segment`.
    pub fn data_for_segment(&self, segment: SegmentId) -> Result<SegmentData> {
        let r = self.record(segment)?;
        Ok(SegmentData {
            cell: r.cell,
            last_used: r.last_used,
        })
    }

    /// Copy out the public data for `synapse`.
    pub fn data_for_synapse(&self, synapse: SynapseId) -> Result<SynapseData> {
        let r = self.synapse_record(synapse)?;
        Ok(SynapseData {
            segment: r.segment,
            presynaptic_cell: r.presynaptic_cell,
            permanence: r.permanence,
        })
    }

    fn record(&self, segment: SegmentId) -> Result<&SegmentRecord> {
        self.segments
            .get(segment as usize)
            .and_then(Option::as_ref)
            .ok_or(TmError::NotFound {
                what: "segment",
                id: segment as u64,
            })
    }

    fn record_mut(&mut self, segment: SegmentId) -> Result<&mut SegmentRecord> {
        self.segments
            .get_mut(segment as usize)
            .and_then(Option::as_mut)
            .ok_or(TmError::NotFound {
                what: "segment",
                id: segment as u64,
            })
    }

    fn synapse_record(&self, synapse: SynapseId) -> Result<&SynapseRecord> {
        self.synapses
            .get(synapse as usize)
            .and_then(Option::as_ref)
            .ok_or(TmError::NotFound {
                what: "synapse",
                id: synapse as u64,
            })
    }

    fn synapse_record_mut(&mut self, synapse: SynapseId) -> Result<&mut SynapseRecord> {
        self.synapses
            .get_mut(synapse as usize)
            .and_then(Option::as_mut)
            .ok_or(TmError::NotFound {
                what: "synapse",
                id: synapse as u64,
            })
    }

    /// Create a new segment on `cell`, evicting the cell's least-recently-used
    /// segment first if `max_segments_per_cell` would otherwise be exceeded.
    ///
    /// `now` is the caller's logical clock (the engine's compute-step
    /// counter), stamped as the segment's initial `last_used` time.
    pub fn create_segment(&mut self, cell: CellIndex, now: u64) -> SegmentId {
        if let Some(limit) = self.limits.max_segments_per_cell {
            while self.num_segments_on_cell(cell) >= limit {
                let victim = self.least_recently_used_segment(cell);
                debug!("evicting LRU segment {victim} on cell {cell} to make room");
                self.destroy_segment(victim)
                    .expect("victim segment came from this cell's own live list");
            }
        }

        let id = self.alloc_segment(SegmentRecord {
            cell,
            last_used: now,
            synapses: Vec::new(),
        });
        self.cell_segments.entry(cell).or_default().push(id);
        self.num_segments += 1;
        trace!("created segment {id} on cell {cell}");
        id
    }

    fn alloc_segment(&mut self, record: SegmentRecord) -> SegmentId {
        if let Some(id) = self.segment_free_list.pop() {
            self.segments[id as usize] = Some(record);
            id
        } else {
            let id = self.segments.len() as SegmentId;
            self.segments.push(Some(record));
            id
        }
    }

    /// Lowest-ID segment among those with the minimum `last_used` on `cell`.
    fn least_recently_used_segment(&self, cell: CellIndex) -> SegmentId {
        let segs = self
            .cell_segments
            .get(&cell)
            .expect("caller only invokes this when the cell has >= 1 segment");
        *segs
            .iter()
            .min_by_key(|&&id| {
                let r = self.segments[id as usize].as_ref().unwrap();
                (r.last_used, id)
            })
            .unwrap()
    }

    /// Destroy a segment and every synapse on it.
    pub fn destroy_segment(&mut self, segment: SegmentId) -> Result<()> {
        let record = self
            .segments
            .get_mut(segment as usize)
            .and_then(Option::take)
            .ok_or(TmError::NotFound {
                what: "segment",
                id: segment as u64,
            })?;

        for syn in &record.synapses {
            self.remove_synapse_from_index(*syn);
            self.synapses[*syn as usize] = None;
            self.synapse_free_list.push(*syn);
            self.num_synapses -= 1;
        }

        if let Some(list) = self.cell_segments.get_mut(&record.cell) {
            list.retain(|&id| id != segment);
        }

        self.segment_free_list.push(segment);
        self.num_segments -= 1;
        Ok(())
    }

    /// Bring `segment`'s LRU timestamp up to date.
    pub fn touch_segment(&mut self, segment: SegmentId, now: u64) -> Result<()> {
        self.record_mut(segment)?.last_used = now;
        Ok(())
    }

    /// Create a new synapse from `presynaptic_cell` onto `segment`, recycling
    /// the weakest-permanence synapse on the segment in place if
    /// `max_synapses_per_segment` would otherwise be exceeded.
    pub fn create_synapse(
        &mut self,
        segment: SegmentId,
        presynaptic_cell: CellIndex,
        permanence: f32,
    ) -> Result<SynapseId> {
        let permanence = permanence.clamp(0.0, 1.0);

        if let Some(limit) = self.limits.max_synapses_per_segment {
            if self.record(segment)?.synapses.len() >= limit {
                let victim = self.weakest_synapse(segment)?;
                debug!("recycling weakest synapse {victim} on segment {segment} to make room");
                self.recycle_synapse(victim, presynaptic_cell, permanence)?;
                return Ok(victim);
            }
        }

        let id = self.alloc_synapse(SynapseRecord {
            segment,
            presynaptic_cell,
            permanence,
        });
        self.record_mut(segment)?.synapses.push(id);
        self.presyn_index.entry(presynaptic_cell).or_default().push(id);
        self.num_synapses += 1;
        trace!("created synapse {id} on segment {segment} <- cell {presynaptic_cell}");
        Ok(id)
    }

    fn alloc_synapse(&mut self, record: SynapseRecord) -> SynapseId {
        if let Some(id) = self.synapse_free_list.pop() {
            self.synapses[id as usize] = Some(record);
            id
        } else {
            let id = self.synapses.len() as SynapseId;
            self.synapses.push(Some(record));
            id
        }
    }

    /// Lowest-ID synapse among those with the minimum permanence on `segment`.
    fn weakest_synapse(&self, segment: SegmentId) -> Result<SynapseId> {
        let record = self.record(segment)?;
        Ok(*record
            .synapses
            .iter()
            .min_by(|&&a, &&b| {
                let pa = self.synapses[a as usize].as_ref().unwrap().permanence;
                let pb = self.synapses[b as usize].as_ref().unwrap().permanence;
                pa.partial_cmp(&pb).unwrap().then(a.cmp(&b))
            })
            .expect("caller only invokes this when the segment has >= 1 synapse"))
    }

    /// Re-point an existing synapse ID at a new presynaptic cell/permanence,
    /// without changing its ID or its owning segment.
    fn recycle_synapse(
        &mut self,
        synapse: SynapseId,
        presynaptic_cell: CellIndex,
        permanence: f32,
    ) -> Result<()> {
        self.remove_synapse_from_index(synapse);
        let record = self.synapse_record_mut(synapse)?;
        record.presynaptic_cell = presynaptic_cell;
        record.permanence = permanence;
        self.presyn_index.entry(presynaptic_cell).or_default().push(synapse);
        Ok(())
    }

    fn remove_synapse_from_index(&mut self, synapse: SynapseId) {
        if let Ok(record) = self.synapse_record(synapse) {
            let presyn = record.presynaptic_cell;
            if let Some(list) = self.presyn_index.get_mut(&presyn) {
                list.retain(|&id| id != synapse);
            }
        }
    }

    /// Destroy a single synapse. Auto-destroys the owning segment if this
    /// was its last synapse and it has dropped below the matching threshold
    /// is the caller's responsibility -- `Connections` does not know
    /// thresholds; see `TemporalMemory::destroy_min_permanence_synapses`.
    pub fn destroy_synapse(&mut self, synapse: SynapseId) -> Result<()> {
        let record = self
            .synapses
            .get_mut(synapse as usize)
            .and_then(Option::take)
            .ok_or(TmError::NotFound {
                what: "synapse",
                id: synapse as u64,
            })?;

        if let Some(list) = self.presyn_index.get_mut(&record.presynaptic_cell) {
            list.retain(|&id| id != synapse);
        }
        if let Some(seg) = self.segments.get_mut(record.segment as usize).and_then(Option::as_mut) {
            seg.synapses.retain(|&id| id != synapse);
        }

        self.synapse_free_list.push(synapse);
        self.num_synapses -= 1;
        Ok(())
    }

    /// Update a synapse's permanence, clamping to `[0.0, 1.0]`. If the result
    /// is `<= 0.0`, the synapse is destroyed and `Ok(true)` is returned to
    /// tell the caller it is gone.
    pub fn update_permanence(&mut self, synapse: SynapseId, delta: f32) -> Result<bool> {
        let new_perm = (self.synapse_record(synapse)?.permanence + delta).clamp(0.0, 1.0);
        if new_perm <= 0.0 {
            self.destroy_synapse(synapse)?;
            return Ok(true);
        }
        self.synapse_record_mut(synapse)?.permanence = new_perm;
        Ok(false)
    }

    /// For every segment with at least one synapse from an active cell,
    /// compute its connected overlap (count of synapses from active cells
    /// with `permanence >= connected_permanence`) and its potential overlap
    /// (count of synapses from active cells regardless of permanence).
    ///
    /// Segments not touched by any active cell are simply absent from both
    /// maps (equivalent to an overlap of zero).
    pub fn compute_activity(
        &self,
        active_cells: &[CellIndex],
        connected_permanence: f32,
    ) -> (HashMap<SegmentId, u32>, HashMap<SegmentId, u32>) {
        let mut connected = HashMap::new();
        let mut potential = HashMap::new();

        for &cell in active_cells {
            let Some(synapses) = self.presyn_index.get(&cell) else {
                continue;
            };
            for &syn in synapses {
                let record = match self.synapses[syn as usize].as_ref() {
                    Some(r) => r,
                    None => continue,
                };
                *potential.entry(record.segment).or_insert(0) += 1;
                if record.permanence >= connected_permanence {
                    *connected.entry(record.segment).or_insert(0) += 1;
                }
            }
        }

        (connected, potential)
    }
}

impl PartialEq for Connections {
    /// Structural (isomorphic) equality: two graphs are equal if, for every
    /// cell, the multiset of segments grown on it is the same, where two
    /// segments are equal if they carry the same multiset of
    /// `(presynaptic_cell, permanence)` synapse pairs. ID identity and
    /// insertion order are irrelevant -- this is what a snapshot round-trip
    /// needs, since IDs are free-list-assigned and may be renumbered.
    fn eq(&self, other: &Self) -> bool {
        if self.num_segments != other.num_segments || self.num_synapses != other.num_synapses {
            return false;
        }

        let mut cells_a: Vec<_> = self.cell_segments.keys().copied().collect();
        let mut cells_b: Vec<_> = other.cell_segments.keys().copied().collect();
        cells_a.sort_unstable();
        cells_b.sort_unstable();
        if cells_a != cells_b {
            return false;
        }

        for cell in cells_a {
            let mut fp_a = self.segment_fingerprints(cell);
            let mut fp_b = other.segment_fingerprints(cell);
            fp_a.sort();
            fp_b.sort();
            if fp_a != fp_b {
                return false;
            }
        }

        true
    }
}

impl Connections {
    fn segment_fingerprints(&self, cell: CellIndex) -> Vec<Vec<(CellIndex, u32)>> {
        self.cell_segments
            .get(&cell)
            .map(|segs| {
                segs.iter()
                    .map(|&seg| {
                        let record = self.segments[seg as usize].as_ref().unwrap();
                        let mut syns: Vec<(CellIndex, u32)> = record
                            .synapses
                            .iter()
                            .map(|&syn| {
                                let s = self.synapses[syn as usize].as_ref().unwrap();
                                (s.presynaptic_cell, s.permanence.to_bits())
                            })
                            .collect();
                        syns.sort();
                        syns
                    })
                    .collect()
            })
            .unwrap_or_default()
    }
}

impl Eq for Connections {}
