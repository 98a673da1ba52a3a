//! Unit tests for query-node emission.

use serde_json::json;

use crate::bounds::Boundary;
use crate::frame::{ClassRefCheck, ClassRefOp, Frame};
use crate::node::{Group, QueryNode, Reference};
use crate::term::Term;

#[test]
fn empty_token_has_no_wrap() {
    assert_eq!(QueryNode::any_token().to_value(), json!({"@type": "koral:token"}));
}

#[test]
fn span_wraps_structure_term() {
    assert_eq!(
        QueryNode::span("s").to_value(),
        json!({
            "@type": "koral:span",
            "wrap": {"@type": "koral:term", "layer": "s", "key": "s"},
        })
    );
}

#[test]
fn non_sentence_span_has_no_layer() {
    assert_eq!(
        QueryNode::span("np").to_value(),
        json!({
            "@type": "koral:span",
            "wrap": {"@type": "koral:term", "key": "np"},
        })
    );
}

#[test]
fn sequence_with_distances() {
    use crate::bounds::{Distance, DistanceKey};
    let group = Group::Sequence {
        operands: vec![
            QueryNode::token(Term::new("orth", "der")),
            QueryNode::token(Term::new("orth", "Baum")),
        ],
        in_order: Some(true),
        distances: vec![Distance::new(DistanceKey::Word, Boundary::new(1, Some(4)))],
    };
    assert_eq!(
        group.to_value(),
        json!({
            "@type": "koral:group",
            "operation": "operation:sequence",
            "inOrder": true,
            "distances": [{
                "@type": "koral:distance",
                "key": "w",
                "boundary": {"@type": "koral:boundary", "min": 1, "max": 4},
            }],
            "operands": [
                {"@type": "koral:token",
                 "wrap": {"@type": "koral:term", "layer": "orth", "key": "der", "match": "match:eq"}},
                {"@type": "koral:token",
                 "wrap": {"@type": "koral:term", "layer": "orth", "key": "Baum", "match": "match:eq"}},
            ],
        })
    );
}

#[test]
fn class_wrap_emits_class_out() {
    let group = Group::class(128, QueryNode::any_token());
    assert_eq!(
        group.to_value(),
        json!({
            "@type": "koral:group",
            "operation": "operation:class",
            "classOut": 128,
            "operands": [{"@type": "koral:token"}],
        })
    );
}

#[test]
fn class_ref_check_group() {
    let inner = Group::position(vec![Frame::Matches], vec![]);
    let group = Group::class_ref_check(
        vec![ClassRefCheck::Equals],
        vec![128, 129],
        inner.into(),
    );
    let value = group.to_value();
    assert_eq!(value["classRefCheck"], json!(["classRefCheck:equals"]));
    assert_eq!(value["classIn"], json!([128, 129]));
    assert!(value.get("classOut").is_none());
}

#[test]
fn class_ref_op_group() {
    let group = Group::class_ref_op(
        ClassRefOp::Union,
        vec![128, 129],
        130,
        QueryNode::any_token(),
    );
    let value = group.to_value();
    assert_eq!(value["classRefOp"], json!("classRefOp:union"));
    assert_eq!(value["classIn"], json!([128, 129]));
    assert_eq!(value["classOut"], json!(130));
}

#[test]
fn repetition_boundary_omits_unbounded_max() {
    let group = Group::repetition(Boundary::new(2, None), QueryNode::any_token());
    assert_eq!(
        group.to_value(),
        json!({
            "@type": "koral:group",
            "operation": "operation:repetition",
            "boundary": {"@type": "koral:boundary", "min": 2},
            "operands": [{"@type": "koral:token"}],
        })
    );
}

#[test]
fn focus_reference_without_operands() {
    assert_eq!(
        Reference::focus(129).to_value(),
        json!({
            "@type": "koral:reference",
            "operation": "operation:focus",
            "classRef": [129],
        })
    );
}

#[test]
fn span_reference_with_length() {
    let r = Reference::span_focus(1, Some(2), QueryNode::any_token());
    assert_eq!(r.to_value()["spanRef"], json!([1, 2]));
}

#[test]
fn boundary_sum_saturates_to_unbounded() {
    let a = Boundary::new(1, Some(4));
    let b = Boundary::new(0, None);
    assert_eq!(a.sum(b), Boundary::new(1, None));
    assert_eq!(a.sum(Boundary::fixed(2)), Boundary::new(3, Some(6)));
}
