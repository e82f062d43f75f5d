//! The Temporal Memory compute step: the five-phase state transition that
//! turns a set of active columns into active, winner, and predictive cell
//! SDRs while growing and pruning the dendrite graph that drives it.

use std::collections::{HashMap, HashSet};

use log::{debug, trace};
use serde::{Deserialize, Serialize};

use crate::activation::{classify_segments, ActiveSegment, SegmentActivity};
use crate::connections::{CellIndex, Connections, ConnectionsLimits, RandomSource, SegmentId};
use crate::error::{Result, TmError};
use crate::topology::Topology;
use crate::utils::sample_without_replacement;

/// Construction parameters for a [`TemporalMemory`].
///
/// Mirrors the option set of the original algorithm's constructor; grouped
/// into a struct (with [`Default`] and [`TemporalMemoryParams::validate`])
/// rather than a long positional argument list.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TemporalMemoryParams {
    /// Shape of the column grid. Flattened internally; must be non-empty
    /// with every dimension positive.
    pub column_dimensions: Vec<usize>,
    /// Number of cells grown per column.
    pub cells_per_column: usize,
    /// Connected-overlap threshold for a segment to be *active*.
    pub activation_threshold: u32,
    /// Permanence assigned to newly grown synapses.
    pub initial_permanence: f32,
    /// Permanence at or above which a synapse is *connected*.
    pub connected_permanence: f32,
    /// Potential-overlap threshold for a segment to be *matching*.
    pub min_threshold: u32,
    /// Upper bound on synapses grown per segment per step.
    pub max_new_synapse_count: u32,
    /// Permanence increment applied to active presynaptic synapses on
    /// reinforcement.
    pub permanence_increment: f32,
    /// Permanence decrement applied to inactive presynaptic synapses on
    /// reinforcement.
    pub permanence_decrement: f32,
    /// Permanence decrement applied during Phase C punishment. `0.0`
    /// disables punishment entirely.
    pub predicted_segment_decrement: f32,
    /// Seed for the engine's internal random source.
    pub seed: u64,
    /// Maximum live segments per cell before LRU eviction. `None` disables
    /// the bound.
    pub max_segments_per_cell: Option<usize>,
    /// Maximum live synapses per segment before weakest-permanence recycle.
    /// `None` disables the bound.
    pub max_synapses_per_segment: Option<usize>,
}

impl Default for TemporalMemoryParams {
    fn default() -> Self {
        Self {
            column_dimensions: vec![2048],
            cells_per_column: 32,
            activation_threshold: 13,
            initial_permanence: 0.21,
            connected_permanence: 0.5,
            min_threshold: 10,
            max_new_synapse_count: 20,
            permanence_increment: 0.1,
            permanence_decrement: 0.1,
            predicted_segment_decrement: 0.0,
            seed: 42,
            max_segments_per_cell: Some(255),
            max_synapses_per_segment: Some(255),
        }
    }
}

impl TemporalMemoryParams {
    /// Validate this parameter set, returning `InvalidArgument` on the first
    /// violation found.
    pub fn validate(&self) -> Result<()> {
        if self.column_dimensions.is_empty() {
            return Err(TmError::InvalidArgument(
                "columnDimensions must be non-empty".into(),
            ));
        }
        if self.column_dimensions.iter().any(|&d| d == 0) {
            return Err(TmError::InvalidArgument(
                "columnDimensions entries must all be positive".into(),
            ));
        }
        if self.cells_per_column == 0 {
            return Err(TmError::InvalidArgument(
                "cellsPerColumn must be > 0".into(),
            ));
        }
        Ok(())
    }

    fn number_of_columns(&self) -> usize {
        self.column_dimensions.iter().product()
    }
}

/// The online sequence-learning engine.
///
/// `TemporalMemory` owns a [`Connections`] graph and steps it forward one
/// set of active columns at a time via [`TemporalMemory::compute`],
/// maintaining `activeCells`/`winnerCells`/`predictiveCells` as it goes.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TemporalMemory {
    params: TemporalMemoryParams,
    topology: Topology,
    connections: Connections,
    rng: RandomSource,
    step: u64,

    active_cells: Vec<CellIndex>,
    winner_cells: Vec<CellIndex>,
    predictive_cells: Vec<CellIndex>,

    /// Overlap of every touched segment against the *current* active_cells,
    /// i.e. what will be `prevActiveCells` on the next `compute` call. This
    /// is computed once, in Phase E, and reused as the classification input
    /// at the top of the next step instead of being recomputed.
    last_activity: SegmentActivity,
}

impl TemporalMemory {
    /// Construct a new engine. Fails if `params` does not validate.
    pub fn new(params: TemporalMemoryParams) -> Result<Self> {
        params.validate()?;

        let topology = Topology::new(params.number_of_columns(), params.cells_per_column);
        let limits = ConnectionsLimits {
            max_segments_per_cell: params.max_segments_per_cell,
            max_synapses_per_segment: params.max_synapses_per_segment,
        };
        let rng = RandomSource::new(params.seed);

        debug!(
            "constructed TemporalMemory: {} columns x {} cells/column",
            topology.number_of_columns(),
            topology.cells_per_column()
        );

        Ok(Self {
            connections: Connections::new(limits),
            topology,
            rng,
            step: 0,
            active_cells: Vec::new(),
            winner_cells: Vec::new(),
            predictive_cells: Vec::new(),
            last_activity: SegmentActivity::default(),
            params,
        })
    }

    /// The currently active cells, sorted ascending.
    #[inline]
    pub fn active_cells(&self) -> &[CellIndex] {
        &self.active_cells
    }

    /// The currently winning cells (one per active column), sorted
    /// ascending. Always a subset of `active_cells()`.
    #[inline]
    pub fn winner_cells(&self) -> &[CellIndex] {
        &self.winner_cells
    }

    /// Cells predicted to become active on the next `compute` call, sorted
    /// ascending.
    #[inline]
    pub fn predictive_cells(&self) -> &[CellIndex] {
        &self.predictive_cells
    }

    /// Read access to the underlying dendrite graph, e.g. for
    /// introspection in tests.
    #[inline]
    pub fn connections(&self) -> &Connections {
        &self.connections
    }

    /// Mutable access to the underlying dendrite graph, for tests and
    /// callers that want to seed segments/synapses directly rather than
    /// through learning (the original algorithm's own test suite relies on
    /// this). Mutations made here are only reflected in the classification
    /// used by the *next* `compute` call if made before any `compute` call
    /// has run yet, or if followed by a fresh `compute` call (whose Phase E
    /// always recomputes activity from the live graph).
    #[inline]
    pub fn connections_mut(&mut self) -> &mut Connections {
        &mut self.connections
    }

    #[inline]
    pub fn number_of_columns(&self) -> usize {
        self.topology.number_of_columns()
    }

    #[inline]
    pub fn number_of_cells(&self) -> usize {
        self.topology.number_of_cells()
    }

    #[inline]
    pub fn column_for_cell(&self, cell: CellIndex) -> Result<usize> {
        self.topology.column_for_cell(cell)
    }

    #[inline]
    pub fn cells_for_column(&self, column: usize) -> Result<Vec<CellIndex>> {
        self.topology.cells_for_column(column)
    }

    #[inline]
    pub fn map_cells_to_columns(&self, cells: &[CellIndex]) -> Result<Vec<usize>> {
        self.topology.map_cells_to_columns(cells)
    }

    /// Clear `activeCells`/`winnerCells`/`predictiveCells` and the cached
    /// classification used to seed the next step. Does not touch the graph.
    pub fn reset(&mut self) {
        self.active_cells.clear();
        self.winner_cells.clear();
        self.predictive_cells.clear();
        self.last_activity = SegmentActivity::default();
    }

    /// Advance the engine by one step given the current set of active
    /// columns. Out-of-range column indices are ignored rather than
    /// rejected, so the engine always survives a step.
    ///
    /// When `learn` is `false`, the graph is left byte-for-byte unchanged.
    pub fn compute(&mut self, active_columns: &[usize], learn: bool) -> Result<()> {
        self.step += 1;
        let now = self.step;

        let number_of_columns = self.topology.number_of_columns();
        let mut columns: Vec<usize> = active_columns
            .iter()
            .copied()
            .filter(|&c| c < number_of_columns)
            .collect();
        columns.sort_unstable();
        columns.dedup();
        let active_columns_set: HashSet<usize> = columns.iter().copied().collect();

        let prev_active_cells = std::mem::take(&mut self.active_cells);
        let prev_winner_cells = std::mem::take(&mut self.winner_cells);
        let prev_active_set: HashSet<CellIndex> = prev_active_cells.into_iter().collect();

        let (active_segs, matching_segs) = classify_segments(
            &self.connections,
            &self.last_activity,
            self.params.activation_threshold,
            self.params.min_threshold,
        );

        let active_by_column = bucket_by_column(&self.topology, &active_segs)?;
        let matching_by_column = bucket_by_column(&self.topology, &matching_segs)?;

        let mut new_active_cells: Vec<CellIndex> = Vec::new();
        let mut new_winner_cells: Vec<CellIndex> = Vec::new();

        for &column in &columns {
            let active_here = active_by_column.get(&column).map_or(&[][..], |v| v.as_slice());

            if !active_here.is_empty() {
                self.activate_predicted_column(
                    active_here,
                    &prev_active_set,
                    &prev_winner_cells,
                    learn,
                    now,
                    &mut new_active_cells,
                    &mut new_winner_cells,
                )?;
            } else {
                let matching_here = matching_by_column
                    .get(&column)
                    .map_or(&[][..], |v| v.as_slice());
                self.burst_column(
                    column,
                    matching_here,
                    &prev_active_set,
                    &prev_winner_cells,
                    learn,
                    now,
                    &mut new_active_cells,
                    &mut new_winner_cells,
                )?;
            }
        }

        if learn && self.params.predicted_segment_decrement > 0.0 {
            self.punish_predicted_inactive_columns(&matching_segs, &active_columns_set, &prev_active_set)?;
        }

        new_active_cells.sort_unstable();
        new_active_cells.dedup();
        new_winner_cells.sort_unstable();
        new_winner_cells.dedup();

        let (connected, potential) = self
            .connections
            .compute_activity(&new_active_cells, self.params.connected_permanence);
        let new_activity = SegmentActivity::new(connected, potential);
        let (next_active_segs, _next_matching_segs) = classify_segments(
            &self.connections,
            &new_activity,
            self.params.activation_threshold,
            self.params.min_threshold,
        );

        let mut predictive_cells: Vec<CellIndex> = next_active_segs.iter().map(|s| s.cell).collect();
        predictive_cells.sort_unstable();
        predictive_cells.dedup();

        self.active_cells = new_active_cells;
        self.winner_cells = new_winner_cells;
        self.predictive_cells = predictive_cells;
        self.last_activity = new_activity;

        trace!(
            "step {}: {} active, {} winner, {} predictive",
            now,
            self.active_cells.len(),
            self.winner_cells.len(),
            self.predictive_cells.len()
        );

        Ok(())
    }

    /// Phase A.1 — a column whose prediction was correct: every cell owning
    /// an active segment becomes active and winner; if learning, every such
    /// correctly-active segment is reinforced and grown.
    fn activate_predicted_column(
        &mut self,
        active_here: &[ActiveSegment],
        prev_active_set: &HashSet<CellIndex>,
        prev_winner_cells: &[CellIndex],
        learn: bool,
        now: u64,
        new_active_cells: &mut Vec<CellIndex>,
        new_winner_cells: &mut Vec<CellIndex>,
    ) -> Result<()> {
        for seg in active_here {
            new_active_cells.push(seg.cell);
            new_winner_cells.push(seg.cell);
        }

        if !learn {
            return Ok(());
        }

        for seg in active_here {
            let potential_overlap = self.last_activity.potential_overlap(seg.segment);
            self.learn_on_segment(
                seg.segment,
                prev_active_set,
                prev_winner_cells,
                potential_overlap,
                now,
            )?;
        }
        Ok(())
    }

    /// Phase A.2 — an unpredicted column bursts: every cell becomes active,
    /// and a single winner cell is selected (and, if learning, a segment
    /// created or reinforced on it).
    #[allow(clippy::too_many_arguments)]
    fn burst_column(
        &mut self,
        column: usize,
        matching_here: &[ActiveSegment],
        prev_active_set: &HashSet<CellIndex>,
        prev_winner_cells: &[CellIndex],
        learn: bool,
        now: u64,
        new_active_cells: &mut Vec<CellIndex>,
        new_winner_cells: &mut Vec<CellIndex>,
    ) -> Result<()> {
        let cells = self.topology.cells_for_column(column)?;
        new_active_cells.extend_from_slice(&cells);

        let best_matching = matching_here.iter().max_by_key(|s| {
            (
                self.last_activity.potential_overlap(s.segment),
                std::cmp::Reverse(s.segment),
            )
        });

        let (winner_cell, selected_segment) = match best_matching {
            Some(seg) => (seg.cell, Some(seg.segment)),
            None => (self.cell_with_fewest_segments(&cells), None),
        };

        new_winner_cells.push(winner_cell);

        if !learn {
            return Ok(());
        }

        match selected_segment {
            Some(segment) => {
                let potential_overlap = self.last_activity.potential_overlap(segment);
                self.learn_on_segment(
                    segment,
                    prev_active_set,
                    prev_winner_cells,
                    potential_overlap,
                    now,
                )?;
            }
            None => {
                if !prev_winner_cells.is_empty() {
                    let segment = self.connections.create_segment(winner_cell, now);
                    self.grow_synapses(segment, prev_winner_cells, self.params.max_new_synapse_count);
                }
            }
        }

        Ok(())
    }

    /// Lowest-segment-count cell in `cells`, ties broken uniformly at random
    /// via the engine's seeded random source.
    fn cell_with_fewest_segments(&mut self, cells: &[CellIndex]) -> CellIndex {
        let min_count = cells
            .iter()
            .map(|&c| self.connections.num_segments_on_cell(c))
            .min()
            .unwrap_or(0);
        let candidates: Vec<CellIndex> = cells
            .iter()
            .copied()
            .filter(|&c| self.connections.num_segments_on_cell(c) == min_count)
            .collect();
        let idx = self.rng.next_index(candidates.len());
        candidates[idx]
    }

    /// Phase B + Phase D for a single segment: reinforce synapses, then grow
    /// new ones sized off the segment's potential overlap as it stood before
    /// this step's reinforcement.
    fn learn_on_segment(
        &mut self,
        segment: SegmentId,
        prev_active_set: &HashSet<CellIndex>,
        prev_winner_cells: &[CellIndex],
        potential_overlap_before: u32,
        now: u64,
    ) -> Result<()> {
        self.reinforce_segment(segment, prev_active_set, now)?;

        let n = self
            .params
            .max_new_synapse_count
            .saturating_sub(potential_overlap_before);
        if n > 0 {
            self.grow_synapses(segment, prev_winner_cells, n);
        }
        Ok(())
    }

    /// Phase B — strengthen synapses from active presynaptic cells, weaken
    /// the rest; destroy the segment if it ends up with no live synapses.
    fn reinforce_segment(
        &mut self,
        segment: SegmentId,
        prev_active_set: &HashSet<CellIndex>,
        now: u64,
    ) -> Result<()> {
        let synapse_ids: Vec<_> = self.connections.synapses_for_segment(segment)?.to_vec();

        for syn in synapse_ids {
            let data = self.connections.data_for_synapse(syn)?;
            let delta = if prev_active_set.contains(&data.presynaptic_cell) {
                self.params.permanence_increment
            } else {
                -self.params.permanence_decrement
            };
            self.connections.update_permanence(syn, delta)?;
        }

        self.connections.touch_segment(segment, now)?;

        if self.connections.synapses_for_segment(segment)?.is_empty() {
            self.connections.destroy_segment(segment)?;
        }
        Ok(())
    }

    /// Phase C — punish every matching segment whose owning column did not
    /// receive an active-column input this step.
    fn punish_predicted_inactive_columns(
        &mut self,
        matching_segs: &[ActiveSegment],
        active_columns: &HashSet<usize>,
        prev_active_set: &HashSet<CellIndex>,
    ) -> Result<()> {
        for seg in matching_segs {
            let column = self.topology.column_for_cell(seg.cell)?;
            if active_columns.contains(&column) {
                continue;
            }

            let synapse_ids: Vec<_> = match self.connections.synapses_for_segment(seg.segment) {
                Ok(list) => list.to_vec(),
                Err(_) => continue, // segment already destroyed earlier this step
            };

            for syn in synapse_ids {
                let data = self.connections.data_for_synapse(syn)?;
                if prev_active_set.contains(&data.presynaptic_cell) {
                    self.connections
                        .update_permanence(syn, -self.params.predicted_segment_decrement)?;
                }
            }

            if self
                .connections
                .synapses_for_segment(seg.segment)
                .map(|s| s.is_empty())
                .unwrap_or(false)
            {
                self.connections.destroy_segment(seg.segment)?;
            }
        }
        Ok(())
    }

    /// Phase D — grow up to `n` new synapses onto `segment`, sampled without
    /// replacement from `prev_winner_cells` minus cells already presynaptic
    /// to it.
    fn grow_synapses(&mut self, segment: SegmentId, prev_winner_cells: &[CellIndex], n: u32) {
        let existing: HashSet<CellIndex> = match self.connections.synapses_for_segment(segment) {
            Ok(list) => list
                .iter()
                .filter_map(|&syn| self.connections.data_for_synapse(syn).ok())
                .map(|d| d.presynaptic_cell)
                .collect(),
            Err(_) => return, // destroyed mid-step (e.g. emptied by reinforcement)
        };

        let candidates: Vec<CellIndex> = prev_winner_cells
            .iter()
            .copied()
            .filter(|c| !existing.contains(c))
            .collect();

        let chosen = sample_without_replacement(&candidates, n as usize, &mut self.rng);
        for cell in chosen {
            let _ = self
                .connections
                .create_synapse(segment, cell, self.params.initial_permanence);
        }
    }
}

fn bucket_by_column(
    topology: &Topology,
    segs: &[ActiveSegment],
) -> Result<HashMap<usize, Vec<ActiveSegment>>> {
    let mut map: HashMap<usize, Vec<ActiveSegment>> = HashMap::new();
    for &seg in segs {
        let column = topology.column_for_cell(seg.cell)?;
        map.entry(column).or_default().push(seg);
    }
    Ok(map)
}
