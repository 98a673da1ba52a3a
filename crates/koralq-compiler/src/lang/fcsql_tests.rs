//! Unit tests for the FCS-QL front end.

use serde_json::json;

use koralq_core::{Reports, status};

use crate::lang::fcsql;

fn compile(query: &str) -> (Option<serde_json::Value>, Reports) {
    let mut reports = Reports::new();
    let compilation = fcsql::compile(query, Some("2.0"), &mut reports);
    (compilation.query.map(|q| q.to_value()), reports)
}

fn term(foundry: &str, layer: &str, key: &str) -> serde_json::Value {
    json!({
        "@type": "koral:term",
        "foundry": foundry,
        "layer": layer,
        "key": key,
        "match": "match:eq",
        "type": "type:regex",
    })
}

fn token(foundry: &str, layer: &str, key: &str) -> serde_json::Value {
    json!({"@type": "koral:token", "wrap": term(foundry, layer, key)})
}

#[test]
fn implicit_term_is_a_text_regex() {
    let (query, reports) = compile("\"Sonne\"");
    assert_eq!(query.unwrap(), token("opennlp", "orth", "Sonne"));
    assert!(!reports.has_errors());
}

#[test]
fn text_layer_maps_to_orth() {
    let (query, _) = compile("[text = \"Sonne\"]");
    assert_eq!(query.unwrap(), token("opennlp", "orth", "Sonne"));
}

#[test]
fn pos_layer_defaults_to_treetagger() {
    let (query, _) = compile("[pos = \"NN\"]");
    assert_eq!(query.unwrap(), token("tt", "p", "NN"));
}

#[test]
fn explicit_qualifier_is_kept() {
    let (query, _) = compile("[cnx:pos = \"N\"]");
    assert_eq!(query.unwrap(), token("cnx", "p", "N"));
}

#[test]
fn case_insensitive_flag() {
    let (query, _) = compile("\"blaue\"/c");
    assert_eq!(
        query.unwrap()["wrap"]["flags"],
        json!(["flags:caseInsensitive"])
    );
}

#[test]
fn explicit_case_sensitive_flag_is_a_no_op() {
    let (query, reports) = compile("\"blaue\"/C");
    assert!(query.unwrap()["wrap"].get("flags").is_none());
    assert!(!reports.has_errors());
}

#[test]
fn literal_matching_flag_is_unsupported() {
    let (query, reports) = compile("\"blaue\"/l");
    assert!(query.is_none());
    assert_eq!(reports.errors[0].0, status::UNKNOWN_QUERY_ELEMENT);
    assert_eq!(
        reports.errors[0].1,
        "SRU diagnostic 48: Regexflag: LITERAL_MATCHING is unsupported."
    );
}

#[test]
fn several_unsupported_flags_list_their_names() {
    let (_, reports) = compile("\"blaue\"/ld");
    assert_eq!(
        reports.errors[0].1,
        "SRU diagnostic 48: Regexflags: [LITERAL_MATCHING, IGNORE_DIACRITICS] are unsupported."
    );
}

#[test]
fn unknown_layer_is_diagnosed() {
    let (query, reports) = compile("[morph = \"x\"]");
    assert!(query.is_none());
    assert_eq!(
        reports.errors[0].1,
        "SRU diagnostic 48: Layer morph is unsupported."
    );
}

#[test]
fn unknown_qualifier_is_diagnosed() {
    let (_, reports) = compile("[z:pos = \"NN\"]");
    assert_eq!(
        reports.errors[0].1,
        "SRU diagnostic 48: Qualifier z is unsupported."
    );
}

#[test]
fn opennlp_lemma_is_diagnosed() {
    let (_, reports) = compile("[opennlp:lemma = \"sein\"]");
    assert_eq!(
        reports.errors[0].1,
        "SRU diagnostic 48: Layer lemma with qualifier opennlp is unsupported."
    );
}

#[test]
fn negated_operator_flips_match() {
    let (query, _) = compile("[pos != \"NN\"]");
    assert_eq!(query.unwrap()["wrap"]["match"], "match:ne");
}

#[test]
fn bang_negation_flips_match() {
    let (query, _) = compile("[!pos = \"NN\"]");
    assert_eq!(query.unwrap()["wrap"]["match"], "match:ne");
}

#[test]
fn negated_group_applies_de_morgan() {
    let (query, _) = compile("[!(text = \"der\" | pos = \"ART\")]");
    let wrap = &query.unwrap()["wrap"];
    assert_eq!(wrap["relation"], "relation:and");
    assert_eq!(wrap["operands"][0]["match"], "match:ne");
    assert_eq!(wrap["operands"][1]["match"], "match:ne");
}

#[test]
fn boolean_segment_expression() {
    let (query, _) = compile("[text = \"Sonne\" & pos = \"NN\"]");
    let wrap = &query.unwrap()["wrap"];
    assert_eq!(wrap["@type"], "koral:termGroup");
    assert_eq!(wrap["relation"], "relation:and");
    assert_eq!(wrap["operands"][0], term("opennlp", "orth", "Sonne"));
    assert_eq!(wrap["operands"][1], term("tt", "p", "NN"));
}

#[test]
fn sequence_of_terms() {
    let (query, _) = compile("\"blaue\" \"Himmel\"");
    assert_eq!(
        query.unwrap(),
        json!({
            "@type": "koral:group",
            "operation": "operation:sequence",
            "operands": [
                token("opennlp", "orth", "blaue"),
                token("opennlp", "orth", "Himmel"),
            ],
        })
    );
}

#[test]
fn disjunction_of_terms() {
    let (query, _) = compile("\"Sonne\" | \"Mond\"");
    let query = query.unwrap();
    assert_eq!(query["operation"], "operation:disjunction");
}

#[test]
fn quantifier_becomes_repetition() {
    let (query, _) = compile("[pos = \"ADJ\"]+");
    let query = query.unwrap();
    assert_eq!(query["operation"], "operation:repetition");
    assert_eq!(
        query["boundary"],
        json!({"@type": "koral:boundary", "min": 1})
    );
}

#[test]
fn bounded_quantifier() {
    let (query, _) = compile("[pos = \"ADJ\"]{1,2}");
    assert_eq!(
        query.unwrap()["boundary"],
        json!({"@type": "koral:boundary", "min": 1, "max": 2})
    );
}

#[test]
fn open_minimum_quantifier() {
    let (query, _) = compile("[pos = \"ADJ\"]{,2}");
    assert_eq!(
        query.unwrap()["boundary"],
        json!({"@type": "koral:boundary", "min": 0, "max": 2})
    );
}

#[test]
fn single_wildcard_gap_is_a_word_distance() {
    let (query, _) = compile("\"Sonne\" [] \"Mond\"");
    let query = query.unwrap();
    assert_eq!(query["operation"], "operation:sequence");
    assert_eq!(query["inOrder"], true);
    assert_eq!(
        query["distances"],
        json!([{
            "@type": "koral:distance",
            "key": "w",
            "boundary": {"@type": "koral:boundary", "min": 1, "max": 1},
        }])
    );
    assert_eq!(query["operands"][0], token("opennlp", "orth", "Sonne"));
    assert_eq!(query["operands"][1], token("opennlp", "orth", "Mond"));
}

#[test]
fn quantified_gap_widens_the_distance() {
    let (query, _) = compile("\"Sonne\" []* \"Mond\"");
    assert_eq!(
        query.unwrap()["distances"][0]["boundary"],
        json!({"@type": "koral:boundary", "min": 0})
    );
}

#[test]
fn adjacent_gaps_merge_their_bounds() {
    let (query, _) = compile("\"Sonne\" []{3} []? \"Mond\"");
    assert_eq!(
        query.unwrap()["distances"][0]["boundary"],
        json!({"@type": "koral:boundary", "min": 3, "max": 4})
    );
}

#[test]
fn second_gap_nests_into_a_subsequence() {
    let (query, _) = compile("\"der\" [] \"blaue\" [] \"Himmel\"");
    let query = query.unwrap();
    assert_eq!(query["operation"], "operation:sequence");
    assert_eq!(query["operands"].as_array().map(|a| a.len()), Some(2));
    let sub = &query["operands"][1];
    assert_eq!(sub["operation"], "operation:sequence");
    assert_eq!(sub["inOrder"], true);
    assert_eq!(sub["operands"][0], token("opennlp", "orth", "blaue"));
    assert_eq!(sub["operands"][1], token("opennlp", "orth", "Himmel"));
}

#[test]
fn within_sentence() {
    let (query, _) = compile("\"Sonne\" within s");
    assert_eq!(
        query.unwrap(),
        json!({
            "@type": "koral:group",
            "operation": "operation:position",
            "frames": ["frames:isAround"],
            "operands": [
                {
                    "@type": "koral:span",
                    "wrap": {
                        "@type": "koral:term",
                        "foundry": "base",
                        "layer": "s",
                        "key": "s",
                    },
                },
                token("opennlp", "orth", "Sonne"),
            ],
        })
    );
}

#[test]
fn within_utterance_is_too_complex() {
    let (query, reports) = compile("\"Sonne\" within u");
    assert!(query.is_none());
    assert_eq!(reports.errors[0].0, status::QUERY_TOO_COMPLEX);
    assert_eq!(
        reports.errors[0].1,
        "Within scope UTTERANCE is currently unsupported."
    );
}

#[test]
fn missing_version_is_diagnosed() {
    let mut reports = Reports::new();
    let compilation = fcsql::compile("\"Sonne\"", None, &mut reports);
    assert!(compilation.query.is_none());
    assert_eq!(reports.errors[0].0, status::MISSING_VERSION);
    assert_eq!(reports.errors[0].1, "SRU diagnostic 7: Version number is missing.");
}

#[test]
fn wrong_version_is_diagnosed() {
    let mut reports = Reports::new();
    fcsql::compile("\"Sonne\"", Some("1.2"), &mut reports);
    assert_eq!(
        reports.errors[0].1,
        "SRU diagnostic 5: Only supports SRU version 2.0."
    );
}

#[test]
fn empty_query_is_diagnosed() {
    let mut reports = Reports::new();
    fcsql::compile("  ", Some("2.0"), &mut reports);
    assert_eq!(reports.errors[0].0, status::NO_QUERY);
    assert_eq!(reports.errors[0].1, "SRU diagnostic 1: No query has been passed.");
}

#[test]
fn unparseable_query_reports_fcs_diagnostic() {
    let (query, reports) = compile("[pos = ");
    assert!(query.is_none());
    assert_eq!(reports.errors[0].0, status::UNKNOWN_QUERY_ERROR);
}

#[test]
fn deeply_nested_groups_are_rejected() {
    let query = format!("{}[text=\"x\"]{}", "(".repeat(80), ")".repeat(80));
    let (query, reports) = compile(&query);
    assert!(query.is_none());
    assert_eq!(reports.errors[0].0, status::QUERY_TOO_COMPLEX);
}
