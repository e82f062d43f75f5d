//! End-to-end tests for the Temporal Memory compute step.
//!
//! Tests cover:
//! - Construction and parameter validation
//! - Correct-prediction and bursting scenarios
//! - Reinforcement/punishment permanence magnitudes
//! - Weak-synapse destruction and LRU segment eviction under capacity
//! - Learning-disabled no-op on the graph
//! - Topology arithmetic
//! - Snapshot round-trip fidelity and determinism

use temporal_memory::{TemporalMemory, TemporalMemoryParams};

fn scenario_params() -> TemporalMemoryParams {
    TemporalMemoryParams {
        column_dimensions: vec![32],
        cells_per_column: 4,
        activation_threshold: 3,
        initial_permanence: 0.21,
        connected_permanence: 0.5,
        min_threshold: 2,
        max_new_synapse_count: 3,
        permanence_increment: 0.10,
        permanence_decrement: 0.10,
        predicted_segment_decrement: 0.0,
        seed: 42,
        max_segments_per_cell: Some(255),
        max_synapses_per_segment: Some(255),
    }
}

#[test]
fn test_construction_rejects_invalid_params() {
    let mut p = scenario_params();
    p.column_dimensions = vec![];
    assert!(TemporalMemory::new(p).is_err());

    let mut p = scenario_params();
    p.cells_per_column = 0;
    assert!(TemporalMemory::new(p).is_err());
}

#[test]
fn test_scenario_1_correct_prediction() {
    let mut tm = TemporalMemory::new(scenario_params()).unwrap();
    let seg = tm.connections_mut().create_segment(4, 0);
    for presyn in 0..4u32 {
        tm.connections_mut().create_synapse(seg, presyn, 0.5).unwrap();
    }

    tm.compute(&[0], true).unwrap();
    assert_eq!(tm.predictive_cells(), &[4]);

    tm.compute(&[1], true).unwrap();
    assert_eq!(tm.active_cells(), &[4]);
}

#[test]
fn test_scenario_2_burst_on_unpredicted_column() {
    let mut tm = TemporalMemory::new(scenario_params()).unwrap();
    tm.compute(&[0], true).unwrap();
    assert_eq!(tm.active_cells(), &[0, 1, 2, 3]);
}

#[test]
fn test_scenario_3_reinforcement_and_punishment_magnitudes() {
    let mut p = scenario_params();
    p.initial_permanence = 0.2;
    p.permanence_increment = 0.10;
    p.permanence_decrement = 0.08;
    let mut tm = TemporalMemory::new(p).unwrap();

    let seg = tm.connections_mut().create_segment(5, 0);
    let s0 = tm.connections_mut().create_synapse(seg, 0, 0.5).unwrap();
    let s1 = tm.connections_mut().create_synapse(seg, 1, 0.5).unwrap();
    let s2 = tm.connections_mut().create_synapse(seg, 2, 0.5).unwrap();
    let s_inactive = tm.connections_mut().create_synapse(seg, 81, 0.5).unwrap();

    tm.compute(&[0], true).unwrap();
    tm.compute(&[1], true).unwrap();

    for s in [s0, s1, s2] {
        let data = tm.connections().data_for_synapse(s).unwrap();
        approx::assert_relative_eq!(data.permanence, 0.60, epsilon = 1e-5);
    }
    let data = tm.connections().data_for_synapse(s_inactive).unwrap();
    approx::assert_relative_eq!(data.permanence, 0.42, epsilon = 1e-5);
}

#[test]
fn test_scenario_4_weak_synapse_destroyed() {
    let mut p = scenario_params();
    p.initial_permanence = 0.2;
    p.permanence_decrement = 0.10;
    let mut tm = TemporalMemory::new(p).unwrap();

    let seg = tm.connections_mut().create_segment(5, 0);
    tm.connections_mut().create_synapse(seg, 0, 0.5).unwrap();
    tm.connections_mut().create_synapse(seg, 1, 0.5).unwrap();
    tm.connections_mut().create_synapse(seg, 2, 0.5).unwrap();
    let weak = tm.connections_mut().create_synapse(seg, 999, 0.009).unwrap();

    tm.compute(&[0], true).unwrap();
    tm.compute(&[1], true).unwrap();

    assert!(tm.connections().data_for_synapse(weak).is_err());
}

#[test]
fn test_scenario_5_lru_segment_eviction() {
    let mut p = scenario_params();
    p.max_segments_per_cell = Some(2);
    p.cells_per_column = 1;
    p.column_dimensions = vec![32];
    let mut tm = TemporalMemory::new(p).unwrap();

    // Each iteration primes a distinct single-cell preceding context (column
    // 0, then 1, then 2) and has it precede a burst of column 9 -- cell 9,
    // column 9's sole cell. None of the three grown one-synapse segments
    // overlaps enough with another priming context to be "matching", so
    // every iteration creates a brand new segment on cell 9 rather than
    // reinforcing one of the earlier ones.
    for priming_column in [0usize, 1, 2] {
        tm.reset();
        tm.compute(&[priming_column], true).unwrap();
        tm.compute(&[9], true).unwrap();
    }

    assert_eq!(tm.connections().num_segments_on_cell(9), 2);
}

#[test]
fn test_scenario_6_learning_disabled_leaves_graph_unchanged() {
    let mut tm = TemporalMemory::new(scenario_params()).unwrap();
    let seg = tm.connections_mut().create_segment(4, 0);
    tm.connections_mut().create_synapse(seg, 0, 0.5).unwrap();

    let before = tm.connections().clone();
    tm.compute(&[0], false).unwrap();
    tm.compute(&[5], false).unwrap();
    tm.compute(&[12], false).unwrap();

    assert_eq!(tm.connections(), &before);
}

#[test]
fn test_invariant_active_cells_belong_to_input_columns() {
    let mut tm = TemporalMemory::new(scenario_params()).unwrap();
    tm.compute(&[0, 3, 7], true).unwrap();

    let expected_columns: std::collections::HashSet<usize> = [0, 3, 7].into_iter().collect();
    for &cell in tm.active_cells() {
        let column = tm.column_for_cell(cell).unwrap();
        assert!(expected_columns.contains(&column));
    }
}

#[test]
fn test_invariant_winner_cells_subset_of_active_cells() {
    let mut tm = TemporalMemory::new(scenario_params()).unwrap();
    tm.compute(&[0, 1, 2, 3], true).unwrap();
    for w in tm.winner_cells() {
        assert!(tm.active_cells().contains(w));
    }
}

#[test]
fn test_invariant_permanences_stay_in_bounds() {
    let mut tm = TemporalMemory::new(scenario_params()).unwrap();
    for step in 0..20 {
        tm.compute(&[step % 32], true).unwrap();
    }
    for &seg in tm.connections().segments_for_cell(0) {
        for &syn in tm.connections().synapses_for_segment(seg).unwrap() {
            let p = tm.connections().data_for_synapse(syn).unwrap().permanence;
            assert!((0.0..=1.0).contains(&p));
        }
    }
}

#[test]
fn test_capacity_bounds_respected_under_sustained_learning() {
    let mut p = scenario_params();
    p.max_segments_per_cell = Some(4);
    p.max_synapses_per_segment = Some(8);
    let mut tm = TemporalMemory::new(p).unwrap();

    for step in 0..200 {
        let col = (step * 7) % 32;
        tm.compute(&[col], true).unwrap();
    }

    for column in 0..32 {
        for &cell in &tm.cells_for_column(column).unwrap() {
            assert!(tm.connections().num_segments_on_cell(cell) <= 4);
            for &seg in tm.connections().segments_for_cell(cell) {
                assert!(tm.connections().synapses_for_segment(seg).unwrap().len() <= 8);
            }
        }
    }
}

#[test]
fn test_topology_arithmetic() {
    let tm = TemporalMemory::new(scenario_params()).unwrap();
    assert_eq!(tm.number_of_columns(), 32);
    assert_eq!(tm.number_of_cells(), 128);
    assert_eq!(tm.column_for_cell(5).unwrap(), 1);
    assert_eq!(tm.cells_for_column(1).unwrap(), vec![4, 5, 6, 7]);
    assert_eq!(tm.map_cells_to_columns(&[0, 5, 15]).unwrap(), vec![0, 1, 3]);
    assert!(tm.column_for_cell(1000).is_err());
}

#[test]
fn test_reset_clears_state_not_graph() {
    let mut tm = TemporalMemory::new(scenario_params()).unwrap();
    tm.compute(&[0], true).unwrap();
    let segments_before = tm.connections().num_segments();

    tm.reset();
    assert!(tm.active_cells().is_empty());
    assert!(tm.winner_cells().is_empty());
    assert!(tm.predictive_cells().is_empty());
    assert_eq!(tm.connections().num_segments(), segments_before);
}

#[test]
fn test_determinism_same_seed_same_outputs() {
    let mut tm1 = TemporalMemory::new(scenario_params()).unwrap();
    let mut tm2 = TemporalMemory::new(scenario_params()).unwrap();

    let sequence: Vec<Vec<usize>> = vec![vec![0, 1], vec![5], vec![0, 10, 20], vec![5], vec![7]];
    for cols in &sequence {
        tm1.compute(cols, true).unwrap();
        tm2.compute(cols, true).unwrap();
        assert_eq!(tm1.active_cells(), tm2.active_cells());
        assert_eq!(tm1.winner_cells(), tm2.winner_cells());
        assert_eq!(tm1.predictive_cells(), tm2.predictive_cells());
    }
    assert_eq!(tm1.connections(), tm2.connections());
}

#[test]
fn test_snapshot_round_trip_is_deep_equal_and_matches_future_outputs() {
    let mut tm = TemporalMemory::new(scenario_params()).unwrap();
    for cols in [&[0, 1][..], &[5][..], &[0, 9][..]] {
        tm.compute(cols, true).unwrap();
    }

    let mut buf = Vec::new();
    temporal_memory::snapshot::write(&tm, &mut buf).unwrap();
    let mut restored = temporal_memory::snapshot::read(&buf[..]).unwrap();
    assert_eq!(tm, restored);

    tm.compute(&[12, 13], true).unwrap();
    restored.compute(&[12, 13], true).unwrap();
    assert_eq!(tm.active_cells(), restored.active_cells());
    assert_eq!(tm.winner_cells(), restored.winner_cells());
    assert_eq!(tm.predictive_cells(), restored.predictive_cells());
    assert_eq!(tm.connections(), restored.connections());
}

#[test]
fn test_out_of_range_column_is_ignored_not_rejected() {
    let mut tm = TemporalMemory::new(scenario_params()).unwrap();
    // Column 32 is out of range for a 32-column grid; it must be silently
    // dropped rather than causing compute() to fail.
    assert!(tm.compute(&[0, 32], true).is_ok());
    assert_eq!(tm.active_cells(), &[0, 1, 2, 3]);
}
