//! Unit tests for the CQL front end.

use serde_json::json;

use koralq_core::{Reports, status};

use crate::lang::cql;

fn compile(query: &str) -> (Option<serde_json::Value>, Reports) {
    let mut reports = Reports::new();
    let compilation = cql::compile(query, Some("1.2"), &mut reports);
    (compilation.query.map(|q| q.to_value()), reports)
}

fn token(key: &str) -> serde_json::Value {
    json!({
        "@type": "koral:token",
        "wrap": {"@type": "koral:term", "layer": "orth", "key": key, "match": "match:eq"},
    })
}

#[test]
fn single_term() {
    let (query, reports) = compile("Sonne");
    assert_eq!(query.unwrap(), token("Sonne"));
    assert!(!reports.has_errors());
}

#[test]
fn quoted_phrase_becomes_sequence() {
    let (query, _) = compile("\"der Mann\"");
    assert_eq!(
        query.unwrap(),
        json!({
            "@type": "koral:group",
            "operation": "operation:sequence",
            "operands": [token("der"), token("Mann")],
        })
    );
}

#[test]
fn bare_words_become_sequence() {
    let (query, reports) = compile("der Mann schläft");
    assert_eq!(
        query.unwrap(),
        json!({
            "@type": "koral:group",
            "operation": "operation:sequence",
            "operands": [token("der"), token("Mann"), token("schläft")],
        })
    );
    assert!(!reports.has_errors());
}

#[test]
fn and_is_unordered_sentence_cooccurrence() {
    let (query, _) = compile("(Sonne) and (scheint)");
    assert_eq!(
        query.unwrap(),
        json!({
            "@type": "koral:group",
            "operation": "operation:sequence",
            "inOrder": false,
            "distances": [{
                "@type": "koral:distance",
                "key": "s",
                "boundary": {"@type": "koral:boundary", "min": 0, "max": 0},
            }],
            "operands": [token("Sonne"), token("scheint")],
        })
    );
}

#[test]
fn or_is_disjunction() {
    let (query, _) = compile("(Sonne) or (Mond)");
    assert_eq!(
        query.unwrap(),
        json!({
            "@type": "koral:group",
            "operation": "operation:disjunction",
            "operands": [token("Sonne"), token("Mond")],
        })
    );
}

#[test]
fn boolean_chain_nests_left() {
    let (query, _) = compile("((Sonne) or (Mond)) and (scheint)");
    let query = query.unwrap();
    assert_eq!(query["operation"], "operation:sequence");
    assert_eq!(query["operands"][0]["operation"], "operation:disjunction");
    assert_eq!(query["operands"][1], token("scheint"));
}

#[test]
fn quoted_phrase_as_disjunct() {
    let (query, _) = compile("(\"Sonne scheint\") or (Mond)");
    let query = query.unwrap();
    assert_eq!(query["operation"], "operation:disjunction");
    assert_eq!(query["operands"][0]["operation"], "operation:sequence");
    assert_eq!(query["operands"][1], token("Mond"));
}

#[test]
fn prox_is_unsupported() {
    let (query, reports) = compile("(Kuh) prox (Germ)");
    assert!(query.is_none());
    assert_eq!(reports.errors[0].0, status::UNKNOWN_QUERY_ELEMENT);
    assert_eq!(
        reports.errors[0].1,
        "SRU diagnostic 48: Only basic search including term-only \
         and boolean (AND,OR) operator queries are currently supported."
    );
}

#[test]
fn boolean_modifier_is_unsupported() {
    let (_, reports) = compile("(Kuh) or/rel.combine=sum (Germ)");
    assert_eq!(reports.errors[0].0, status::UNSUPPORTED_SRU_FEATURE);
    assert_eq!(
        reports.errors[0].1,
        "SRU diagnostic 20: Relation modifier rel.combine = sum is not supported."
    );
}

#[test]
fn unknown_index_is_unsupported() {
    let (_, reports) = compile("dc.title any Germ");
    assert_eq!(
        reports.errors[0].1,
        "SRU diagnostic 16: Index dc.title is not supported."
    );
}

#[test]
fn unknown_relation_is_unsupported() {
    let (_, reports) = compile("cql.serverChoice any Germ");
    assert_eq!(
        reports.errors[0].1,
        "SRU diagnostic 19: Relation any is not supported."
    );
}

#[test]
fn supported_index_clause_compiles_to_term() {
    let (query, reports) = compile("words = Haus");
    assert_eq!(query.unwrap(), token("Haus"));
    assert!(!reports.has_errors());
}

#[test]
fn empty_query_is_diagnosed() {
    let (query, reports) = compile("");
    assert!(query.is_none());
    assert_eq!(reports.errors[0].0, status::MALFORMED_QUERY);
    assert_eq!(
        reports.errors[0].1,
        "SRU diagnostic 27: An empty query is unsupported."
    );
}

#[test]
fn unsupported_version_is_diagnosed() {
    let mut reports = Reports::new();
    cql::compile("Sonne", Some("2.0"), &mut reports);
    assert_eq!(reports.errors[0].0, status::UNSUPPORTED_VERSION);
}

#[test]
fn missing_version_defaults() {
    let mut reports = Reports::new();
    let compilation = cql::compile("Sonne", None, &mut reports);
    assert!(compilation.query.is_some());
    assert!(!reports.has_errors());
}

#[test]
fn deeply_nested_groups_are_rejected() {
    let query = format!("{}Sonne{}", "(".repeat(80), ")".repeat(80));
    let (query, reports) = compile(&query);
    assert!(query.is_none());
    assert_eq!(reports.errors[0].0, status::QUERY_TOO_COMPLEX);
}
