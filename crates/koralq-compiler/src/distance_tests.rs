//! Unit tests for distance/boundary normalization.

use crate::distance::{MAXIMUM_DISTANCE, collapse_run, parse_proximity};
use koralq_core::{Boundary, DistanceKey, Reports, status};

#[test]
fn run_collapse_sums_element_wise() {
    let run = [Boundary::fixed(1), Boundary::new(2, Some(5)), Boundary::new(0, Some(1))];
    assert_eq!(collapse_run(&run), Boundary::new(3, Some(7)));
}

#[test]
fn run_collapse_is_unbounded_if_any_member_is() {
    let run = [Boundary::fixed(1), Boundary::new(0, None)];
    assert_eq!(collapse_run(&run), Boundary::new(1, None));
}

#[test]
fn directed_word_distance() {
    let mut reports = Reports::new();
    let prox = parse_proximity("+w1:4", false, &mut reports).unwrap();
    assert!(prox.in_order);
    assert!(!prox.inverted);
    assert_eq!(prox.distances.len(), 1);
    assert_eq!(prox.distances[0].key, DistanceKey::Word);
    assert_eq!(prox.distances[0].boundary, Boundary::new(1, Some(4)));
    assert!(reports.errors.is_empty());
}

#[test]
fn single_value_means_up_to_n() {
    let mut reports = Reports::new();
    let prox = parse_proximity("w10", false, &mut reports).unwrap();
    assert!(!prox.in_order);
    assert_eq!(prox.distances[0].boundary, Boundary::new(0, Some(10)));
}

#[test]
fn value_pair_normalizes_to_min_max() {
    let mut reports = Reports::new();
    let prox = parse_proximity("w4:1", false, &mut reports).unwrap();
    assert_eq!(prox.distances[0].boundary, Boundary::new(1, Some(4)));
}

#[test]
fn multiple_dimension_clauses() {
    let mut reports = Reports::new();
    let prox = parse_proximity("+w1:4,s0,p1:3", false, &mut reports).unwrap();
    let keys: Vec<DistanceKey> = prox.distances.iter().map(|d| d.key).collect();
    assert_eq!(keys, vec![DistanceKey::Word, DistanceKey::Sentence, DistanceKey::Paragraph]);
    assert_eq!(prox.distances[1].boundary, Boundary::new(0, Some(0)));
}

#[test]
fn minus_direction_inverts_operands() {
    let mut reports = Reports::new();
    let prox = parse_proximity("-w5", false, &mut reports).unwrap();
    assert!(prox.in_order);
    assert!(prox.inverted);
}

#[test]
fn exclusion_marks_every_distance() {
    let mut reports = Reports::new();
    let prox = parse_proximity("w3,s0", true, &mut reports).unwrap();
    assert!(prox.distances.iter().all(|d| d.exclude));
}

#[test]
fn cosmas_distances_carry_legacy_type_tag() {
    let mut reports = Reports::new();
    let prox = parse_proximity("w3", false, &mut reports).unwrap();
    assert_eq!(prox.distances[0].to_value()["@type"], "cosmas:distance");
}

#[test]
fn oversized_distance_crops_with_warning() {
    let mut reports = Reports::new();
    let prox = parse_proximity("w500", false, &mut reports).unwrap();
    assert_eq!(prox.distances[0].boundary.max, Some(MAXIMUM_DISTANCE));
    assert_eq!(reports.warnings.len(), 1);
}

#[test]
fn missing_measure_is_reported() {
    let mut reports = Reports::new();
    assert!(parse_proximity("3:4", false, &mut reports).is_none());
    assert_eq!(reports.errors[0].0, status::ERR_PROX_MEAS_NULL);
}

#[test]
fn two_measures_in_one_clause_are_rejected() {
    let mut reports = Reports::new();
    assert!(parse_proximity("ws3", false, &mut reports).is_none());
    assert_eq!(reports.errors[0].0, status::ERR_PROX_MEAS_TOOGREAT);
}

#[test]
fn missing_value_is_reported() {
    let mut reports = Reports::new();
    assert!(parse_proximity("w", false, &mut reports).is_none());
    assert_eq!(reports.errors[0].0, status::ERR_PROX_VAL_NULL);
}

#[test]
fn conflicting_directions_are_rejected() {
    let mut reports = Reports::new();
    assert!(parse_proximity("+w3,-s0", false, &mut reports).is_none());
    assert_eq!(reports.errors[0].0, status::ERR_PROX_DIR_TOOGREAT);
}

#[test]
fn grouping_option_is_recognized() {
    let mut reports = Reports::new();
    let prox = parse_proximity("w3:4,min", false, &mut reports).unwrap();
    assert!(prox.grouping);
}
