//! Unit tests for the Poliqarp+ front end.

use serde_json::json;

use koralq_core::{Reports, status};

use crate::lang::poliqarp;

fn run(query: &str) -> (Option<serde_json::Value>, Option<serde_json::Value>, Reports) {
    let mut reports = Reports::new();
    let compilation = poliqarp::compile(query, &mut reports);
    (
        compilation.query.map(|q| q.to_value()),
        compilation.collection,
        reports,
    )
}

fn compile(query: &str) -> (Option<serde_json::Value>, Reports) {
    let (query, _, reports) = run(query);
    (query, reports)
}

fn token(layer: &str, key: &str) -> serde_json::Value {
    json!({
        "@type": "koral:token",
        "wrap": {"@type": "koral:term", "layer": layer, "key": key, "match": "match:eq"},
    })
}

#[test]
fn bare_word_is_an_orth_token() {
    let (query, reports) = compile("Baum");
    assert_eq!(query.unwrap(), token("orth", "Baum"));
    assert!(!reports.has_errors());
}

#[test]
fn bracketed_term_with_base_layer_mapping() {
    let (query, _) = compile("[base=Mann]");
    assert_eq!(query.unwrap(), token("lemma", "Mann"));
}

#[test]
fn foundry_key_and_value() {
    let (query, _) = compile("[mate/m=temp:pres]");
    assert_eq!(
        query.unwrap()["wrap"],
        json!({
            "@type": "koral:term",
            "foundry": "mate",
            "layer": "m",
            "key": "temp",
            "value": "pres",
            "match": "match:eq",
        })
    );
}

#[test]
fn punct_layer_rewrites_to_orth() {
    let (query, _) = compile("[punct=';']");
    assert_eq!(
        query.unwrap()["wrap"],
        json!({
            "@type": "koral:term",
            "layer": "orth",
            "key": ";",
            "match": "match:eq",
            "type": "type:punct",
        })
    );
}

#[test]
fn quoted_key_is_a_regex() {
    let (query, _) = compile("[orth=\"geh.*\"]");
    let wrap = query.unwrap()["wrap"].clone();
    assert_eq!(wrap["key"], "geh.*");
    assert_eq!(wrap["type"], "type:regex");
}

#[test]
fn verbatim_key_resolves_quote_escapes() {
    let (query, _) = compile(r"[orth='D\'Artagnan']");
    let wrap = query.unwrap()["wrap"].clone();
    assert_eq!(wrap["key"], "D'Artagnan");
    assert!(wrap.get("type").is_none());
}

#[test]
fn double_negation_cancels() {
    let (query, _) = compile("[!p!=NN]");
    assert_eq!(query.unwrap()["wrap"]["match"], "match:eq");

    let (query, _) = compile("![p!=NN]");
    assert_eq!(query.unwrap()["wrap"]["match"], "match:eq");
}

#[test]
fn negation_distributes_over_groups() {
    let (query, _) = compile("![base=der & p=NN]");
    let wrap = query.unwrap()["wrap"].clone();
    assert_eq!(wrap["relation"], "relation:or");
    assert_eq!(wrap["operands"][0]["match"], "match:ne");
    assert_eq!(wrap["operands"][1]["match"], "match:ne");
}

#[test]
fn term_disjunction_and_conjunction_nest() {
    let (query, _) = compile("[base=der & (orth=das | p=NN)]");
    let wrap = query.unwrap()["wrap"].clone();
    assert_eq!(wrap["relation"], "relation:and");
    assert_eq!(wrap["operands"][1]["relation"], "relation:or");
}

#[test]
fn case_insensitive_flag() {
    let (query, _) = compile("[orth=deutscher/i]");
    assert_eq!(
        query.unwrap()["wrap"]["flags"],
        json!(["flags:caseInsensitive"])
    );
}

#[test]
fn substring_flag_escapes_literal_keys() {
    let (query, _) = compile("[orth=deutsch/x]");
    let wrap = query.unwrap()["wrap"].clone();
    assert_eq!(wrap["key"], ".*?deutsch.*?");
    assert_eq!(wrap["type"], "type:regex");
}

#[test]
fn substring_flag_keeps_regex_keys_verbatim() {
    let (query, _) = compile("[orth=\"geh(e|st)\"/x]");
    let wrap = query.unwrap()["wrap"].clone();
    assert_eq!(wrap["key"], ".*?geh(e|st).*?");
    assert_eq!(wrap["type"], "type:regex");
}

#[test]
fn repetition_ranges() {
    let (query, _) = compile("der{3}");
    let query = query.unwrap();
    assert_eq!(query["operation"], "operation:repetition");
    assert_eq!(query["boundary"], json!({"@type": "koral:boundary", "min": 3, "max": 3}));

    let (query, _) = compile("der{,3}");
    assert_eq!(query.unwrap()["boundary"], json!({"@type": "koral:boundary", "min": 0, "max": 3}));

    let (query, _) = compile("der{3,}");
    assert_eq!(query.unwrap()["boundary"], json!({"@type": "koral:boundary", "min": 3}));

    let (query, _) = compile("der*");
    assert_eq!(query.unwrap()["boundary"], json!({"@type": "koral:boundary", "min": 0}));

    let (query, _) = compile("der+");
    assert_eq!(query.unwrap()["boundary"], json!({"@type": "koral:boundary", "min": 1}));

    let (query, _) = compile("der?");
    assert_eq!(query.unwrap()["boundary"], json!({"@type": "koral:boundary", "min": 0, "max": 1}));
}

#[test]
fn single_empty_token_stays_bare() {
    let (query, _) = compile("[]");
    assert_eq!(query.unwrap(), json!({"@type": "koral:token"}));
}

#[test]
fn empty_token_run_folds_into_one_repetition() {
    let (query, _) = compile("[][]");
    assert_eq!(
        query.unwrap(),
        json!({
            "@type": "koral:group",
            "operation": "operation:repetition",
            "boundary": {"@type": "koral:boundary", "min": 2, "max": 2},
            "operands": [{"@type": "koral:token"}],
        })
    );
}

#[test]
fn quantified_empty_tokens_sum_their_bounds() {
    let (query, _) = compile("der []{1,2}[] Baum");
    let query = query.unwrap();
    assert_eq!(query["operation"], "operation:sequence");
    let filler = &query["operands"][1];
    assert_eq!(filler["operation"], "operation:repetition");
    assert_eq!(filler["boundary"], json!({"@type": "koral:boundary", "min": 2, "max": 3}));
    assert_eq!(query["operands"][2], token("orth", "Baum"));
}

#[test]
fn sequence_and_top_level_disjunction() {
    let (query, _) = compile("[base=der]|[base=das]");
    let query = query.unwrap();
    assert_eq!(query["operation"], "operation:disjunction");
    assert_eq!(query["operands"][0], token("lemma", "der"));
    assert_eq!(query["operands"][1], token("lemma", "das"));

    let (query, _) = compile("der Baum");
    let query = query.unwrap();
    assert_eq!(query["operation"], "operation:sequence");
    assert_eq!(query["operands"][1], token("orth", "Baum"));
}

#[test]
fn sentence_span_has_only_its_key() {
    let (query, _) = compile("<s>");
    assert_eq!(
        query.unwrap(),
        json!({
            "@type": "koral:span",
            "wrap": {"@type": "koral:term", "key": "s"},
        })
    );
}

#[test]
fn span_with_foundry_and_layer_asserts_no_polarity_on_equals() {
    let (query, _) = compile("<cnx/c=vp>");
    assert_eq!(
        query.unwrap()["wrap"],
        json!({"@type": "koral:term", "foundry": "cnx", "layer": "c", "key": "vp"})
    );

    let (query, _) = compile("<cnx/c!=vp>");
    assert_eq!(query.unwrap()["wrap"]["match"], "match:ne");
}

#[test]
fn span_regex_key() {
    let (query, _) = compile("<\".*\">");
    let wrap = query.unwrap()["wrap"].clone();
    assert_eq!(wrap["key"], ".*");
    assert_eq!(wrap["type"], "type:regex");
}

#[test]
fn span_attributes_use_key_value_pairs() {
    let (query, _) = compile("<cnx/c!=vp class!=header>");
    let query = query.unwrap();
    assert_eq!(query["wrap"]["match"], "match:ne");
    assert_eq!(
        query["attr"],
        json!({"@type": "koral:term", "key": "class", "value": "header", "match": "match:ne"})
    );
}

#[test]
fn span_attribute_negation_uses_de_morgan() {
    let (query, _) = compile("<cnx/c!=vp !(class=header & id=7)>");
    let attr = query.unwrap()["attr"].clone();
    assert_eq!(attr["relation"], "relation:or");
    assert_eq!(attr["operands"][0]["key"], "class");
    assert_eq!(attr["operands"][0]["match"], "match:ne");
    assert_eq!(attr["operands"][1]["key"], "id");
    assert_eq!(attr["operands"][1]["value"], "7");
    assert_eq!(attr["operands"][1]["match"], "match:ne");
}

#[test]
fn unnumbered_class_defaults_to_one() {
    let (query, reports) = compile("{[base=Mann]}");
    let query = query.unwrap();
    assert_eq!(query["operation"], "operation:class");
    assert_eq!(query["classOut"], 1);
    assert_eq!(query["operands"][0], token("lemma", "Mann"));
    assert_eq!(reports.highlight, vec![1]);
}

#[test]
fn nested_classes_highlight_outside_in() {
    let (query, reports) = compile("{2:{1:[tt/p=ADJA]}[mate/p=NN]}");
    let query = query.unwrap();
    assert_eq!(query["classOut"], 2);
    assert_eq!(query["operands"][0]["operation"], "operation:sequence");
    assert_eq!(query["operands"][0]["operands"][0]["classOut"], 1);
    assert_eq!(reports.highlight, vec![2, 1]);
}

#[test]
fn focus_defaults_to_class_one() {
    let (query, reports) = compile("focus([orth=Der]{[orth=Mann]})");
    let query = query.unwrap();
    assert_eq!(query["@type"], "koral:reference");
    assert_eq!(query["operation"], "operation:focus");
    assert_eq!(query["classRef"], json!([1]));
    assert_eq!(query["operands"][0]["operation"], "operation:sequence");
    assert_eq!(query["operands"][0]["operands"][1]["classOut"], 1);
    assert_eq!(reports.highlight, vec![1]);
}

#[test]
fn focus_with_explicit_reference() {
    let (query, _) = compile("focus(3:startswith(<s>,{3:<np>}))");
    let query = query.unwrap();
    assert_eq!(query["classRef"], json!([3]));
    let position = &query["operands"][0];
    assert_eq!(position["operation"], "operation:position");
    assert_eq!(position["frames"], json!(["frames:startsWith", "frames:matches"]));
    assert_eq!(position["operands"][1]["classOut"], 3);
}

#[test]
fn split_with_reference_pair_intersects() {
    let (query, reports) =
        compile("split(2|3: startswith(<s>, {3:[base=der]{1:[mate/p=ADJA]{2:[tt/p=NN]}}}))");
    let query = query.unwrap();
    assert_eq!(query["operation"], "operation:split");
    assert_eq!(query["classRef"], json!([2, 3]));
    assert_eq!(query["classRefOp"], "classRefOp:intersection");
    assert_eq!(reports.highlight, vec![3, 1, 2]);
}

#[test]
fn submatch_span_reference() {
    let (query, _) = compile("submatch(1,4:contains(<s>,[base=Haus]))");
    let query = query.unwrap();
    assert_eq!(query["@type"], "koral:reference");
    assert_eq!(query["operation"], "operation:focus");
    assert_eq!(query["spanRef"], json!([1, 4]));
    assert_eq!(query["operands"][0]["frames"], json!(["frames:isAround"]));

    let (query, _) = compile("submatch(1:<s>)");
    assert_eq!(query.unwrap()["spanRef"], json!([1]));
}

#[test]
fn contains_position_frames() {
    let (query, _) = compile("contains(<s>,[base=Haus])");
    let query = query.unwrap();
    assert_eq!(query["operation"], "operation:position");
    assert_eq!(query["frames"], json!(["frames:isAround"]));
    assert_eq!(query["operands"][0]["wrap"]["key"], "s");
    assert_eq!(query["operands"][1], token("lemma", "Haus"));

    let (query, _) = compile("overlaps(<s>,der)");
    assert_eq!(
        query.unwrap()["frames"],
        json!(["frames:overlapsLeft", "frames:overlapsRight"])
    );
}

#[test]
fn group_repetition_inside_position() {
    let (query, _) = compile("contains(<s>, (der){3,})");
    let inner = query.unwrap()["operands"][1].clone();
    assert_eq!(inner["operation"], "operation:repetition");
    assert_eq!(inner["boundary"], json!({"@type": "koral:boundary", "min": 3}));
}

#[test]
fn dominance_relation_carries_constituency_layer() {
    let (query, _) = compile("dominates(<s>,<np>)");
    let query = query.unwrap();
    assert_eq!(query["operation"], "operation:relation");
    assert_eq!(
        query["relation"],
        json!({"@type": "koral:relation", "wrap": {"@type": "koral:term", "layer": "c"}})
    );
    assert_eq!(query["operands"][0]["wrap"]["key"], "s");
    assert_eq!(query["operands"][1]["wrap"]["key"], "np");
}

#[test]
fn relation_spec_sets_edge_label_and_bounds() {
    let (query, _) = compile("relatesTo(mate/d=HEAD:<np>,[base=Baum])");
    let relation = query.unwrap()["relation"].clone();
    assert_eq!(
        relation["wrap"],
        json!({"@type": "koral:term", "foundry": "mate", "layer": "d", "key": "HEAD"})
    );

    let (query, _) = compile("dominates(cnx/c{1,5}:<vp>,<np>)");
    let relation = query.unwrap()["relation"].clone();
    assert_eq!(relation["wrap"]["foundry"], "cnx");
    assert_eq!(relation["boundary"], json!({"@type": "koral:boundary", "min": 1, "max": 5}));
}

#[test]
fn bare_relation_operands_become_orth_tokens() {
    let (query, _) = compile("dependency([base=fällen],[base=Baum])");
    let query = query.unwrap();
    assert_eq!(query["relation"]["wrap"]["layer"], "d");
    assert_eq!(query["operands"][0], token("lemma", "fällen"));

    let (query, _) = compile("relatesTo(Baum,<np>)");
    let query = query.unwrap();
    assert_eq!(query["relation"]["wrap"], json!({"@type": "koral:term"}));
    assert_eq!(query["operands"][0], token("orth", "Baum"));
}

#[test]
fn alignment_classes_both_neighbors() {
    let (query, reports) = compile("[orth=der]^[orth=Mann]");
    let query = query.unwrap();
    assert_eq!(query["operation"], "operation:sequence");
    assert_eq!(query["operands"][0]["classOut"], 1);
    assert_eq!(query["operands"][0]["operands"][0]["wrap"]["key"], "der");
    assert_eq!(query["operands"][1]["classOut"], 2);
    assert_eq!(reports.alignment, vec![(1, 2)]);
    assert!(reports.highlight.is_empty());
}

#[test]
fn alignment_wraps_only_immediate_neighbors() {
    let (query, reports) = compile("[orth=der]^[orth=große][orth=Mann]");
    let query = query.unwrap();
    assert_eq!(query["operands"][0]["classOut"], 1);
    assert_eq!(query["operands"][1]["classOut"], 2);
    assert_eq!(query["operands"][2], token("orth", "Mann"));
    assert_eq!(reports.alignment, vec![(1, 2)]);
}

#[test]
fn chained_alignment_reuses_shared_class() {
    let (query, reports) = compile("([base=a]^[base=b]^[base=c])|[base=d]");
    let query = query.unwrap();
    assert_eq!(query["operation"], "operation:disjunction");
    let seq = &query["operands"][0];
    assert_eq!(seq["operands"][0]["classOut"], 1);
    assert_eq!(seq["operands"][1]["classOut"], 2);
    assert_eq!(seq["operands"][2]["classOut"], 3);
    assert_eq!(reports.alignment, vec![(1, 2), (2, 3)]);
}

#[test]
fn alignment_at_query_edges_uses_minus_one() {
    let (query, reports) = compile("^ Mann");
    let query = query.unwrap();
    assert_eq!(query["operation"], "operation:class");
    assert_eq!(query["classOut"], 1);
    assert_eq!(reports.alignment, vec![(-1, 1)]);

    let (query, reports) = compile("Mann ^");
    assert_eq!(query.unwrap()["classOut"], 1);
    assert_eq!(reports.alignment, vec![(1, -1)]);
}

#[test]
fn within_wraps_the_query_in_a_sentence_span() {
    let (query, _) = compile("[base=Baum] within s");
    let query = query.unwrap();
    assert_eq!(query["operation"], "operation:position");
    assert_eq!(query["frames"], json!(["frames:isAround"]));
    assert_eq!(
        query["operands"][0]["wrap"],
        json!({"@type": "koral:term", "layer": "s", "key": "s"})
    );
    assert_eq!(query["operands"][1], token("lemma", "Baum"));
}

#[test]
fn query_references() {
    let (query, _) = compile("{#test}");
    assert_eq!(query.unwrap(), json!({"@type": "koral:queryRef", "ref": "test"}));

    let (query, _) = compile("Der {#admin/example} [orth=Baum]");
    let query = query.unwrap();
    assert_eq!(query["operands"][1]["@type"], "koral:queryRef");
    assert_eq!(query["operands"][1]["ref"], "admin/example");

    let (query, _) = compile("[orth=Der]{#admin/example}{1,}[orth=Baum]");
    let repeated = query.unwrap()["operands"][1].clone();
    assert_eq!(repeated["operation"], "operation:repetition");
    assert_eq!(repeated["operands"][0]["@type"], "koral:queryRef");
}

#[test]
fn meta_clause_becomes_a_document_constraint() {
    let (query, collection, reports) = run("x meta textClass=Sport");
    assert_eq!(query.unwrap()["wrap"]["key"], "x");
    assert_eq!(
        collection.unwrap(),
        json!({"@type": "koral:doc", "key": "textClass", "value": "Sport", "match": "match:eq"})
    );
    assert_eq!(reports.warnings.len(), 1);
    assert!(reports.warnings[0].starts_with("You used the 'meta' keyword"));
}

#[test]
fn multiple_meta_fields_form_a_doc_group() {
    let (_, collection, _) = run("x meta textClass=Sport corpusSigle=WPD");
    let collection = collection.unwrap();
    assert_eq!(collection["@type"], "koral:docGroup");
    assert_eq!(collection["operation"], "operation:and");
    assert_eq!(collection["operands"][0]["key"], "textClass");
    assert_eq!(collection["operands"][1]["key"], "corpusSigle");
}

#[test]
fn unparsable_query_reports_the_source() {
    let (query, reports) = compile("[orth=der");
    assert!(query.is_none());
    assert_eq!(reports.errors[0].0, status::MALFORMED_QUERY);
    assert_eq!(reports.errors[0].1, "Could not parse query >>> [orth=der <<<.");
}

#[test]
fn empty_query_is_an_error() {
    let (query, reports) = compile("   ");
    assert!(query.is_none());
    assert_eq!(reports.errors[0].0, status::NO_QUERY);
}

#[test]
fn deeply_nested_groups_are_rejected() {
    let query = format!("{}[base=x]{}", "(".repeat(80), ")".repeat(80));
    let (query, reports) = compile(&query);
    assert!(query.is_none());
    assert_eq!(reports.errors[0].0, status::QUERY_TOO_COMPLEX);
}

#[test]
fn shrink_aliases_focus_with_a_warning() {
    let (query, reports) = compile("shrink([orth=Der]{[orth=Mann]})");
    let query = query.unwrap();
    assert_eq!(query["operation"], "operation:focus");
    assert_eq!(query["classRef"], json!([1]));
    assert_eq!(reports.warnings, vec!["'shrink' is deprecated; use 'focus' instead."]);
}
