//! CQL (Contextual Query Language) front end.
//!
//! Covers the SRU "basic search" profile: bare terms, quoted phrases,
//! and boolean AND/OR combinations over them. `AND` compiles to an
//! unordered sequence constrained to the same sentence; `OR` to a
//! disjunction. Everything else in the CQL grammar is answered with
//! the matching SRU diagnostic instead of a query.

use logos::Logos;

use koralq_core::status;
use koralq_core::{Boundary, Distance, DistanceKey, Group, QueryNode, Reports, Term};

use super::Compilation;
use crate::literal;

/// Relation words the CQL grammar knows; presence in this list decides
/// whether `a rel b` parses as an index clause or as three terms.
const KNOWN_RELATIONS: &[&str] = &[
    "=", "==", "<>", "<", ">", "<=", ">=", "adj", "all", "any", "encloses", "exact", "scr",
    "within",
];

const SUPPORTED_RELATIONS: &[&str] = &["=", "exact", "scr"];
const SUPPORTED_INDEXES: &[&str] = &["cql.serverChoice", "words"];

const PARSE_ERROR: &str = "Error parsing CQL";

#[derive(Logos, Debug, Clone, Copy, PartialEq, Eq)]
#[logos(skip r"[ \t\r\n]+")]
enum Tok {
    #[token("(")]
    ParenOpen,

    #[token(")")]
    ParenClose,

    #[regex(r#""(?:[^"\\]|\\.)*""#)]
    Quoted,

    #[regex(r#"[^\s()"]+"#)]
    Word,
}

pub fn compile(query: &str, version: Option<&str>, reports: &mut Reports) -> Compilation {
    check_version(version, reports);
    if query.trim().is_empty() {
        reports.error(
            status::MALFORMED_QUERY,
            "SRU diagnostic 27: An empty query is unsupported.",
        );
        return Compilation::empty();
    }
    let Some(tokens) = lex(query, reports) else {
        return Compilation::empty();
    };
    let mut parser = Parser { source: query, tokens, pos: 0, depth: 0 };
    let node = parser.expr(reports);
    if node.is_some() && parser.pos < parser.tokens.len() {
        reports.error(status::MALFORMED_QUERY, PARSE_ERROR);
        return Compilation::empty();
    }
    match node {
        Some(node) => Compilation::query(node),
        None => {
            super::ensure_reported(reports, status::MALFORMED_QUERY, PARSE_ERROR);
            Compilation::empty()
        }
    }
}

/// CQL arrives in SRU requests carrying 1.1 or 1.2; anything else is
/// diagnosed but the query is still translated with 1.2 semantics.
fn check_version(version: Option<&str>, reports: &mut Reports) {
    if let Some(version) = version
        && version != "1.1"
        && version != "1.2"
    {
        reports.error(
            status::UNSUPPORTED_VERSION,
            "SRU diagnostic 5: Only supports SRU version 1.1 and 1.2.",
        );
    }
}

fn lex(source: &str, reports: &mut Reports) -> Option<Vec<(Tok, std::ops::Range<usize>)>> {
    let mut tokens = Vec::new();
    let mut lexer = Tok::lexer(source);
    while let Some(result) = lexer.next() {
        match result {
            Ok(kind) => tokens.push((kind, lexer.span())),
            Err(()) => {
                reports.error(status::MALFORMED_QUERY, PARSE_ERROR);
                return None;
            }
        }
    }
    Some(tokens)
}

struct Parser<'s> {
    source: &'s str,
    tokens: Vec<(Tok, std::ops::Range<usize>)>,
    pos: usize,
    depth: usize,
}

impl Parser<'_> {
    fn peek(&self) -> Option<(Tok, &str)> {
        self.tokens
            .get(self.pos)
            .map(|(kind, span)| (*kind, &self.source[span.clone()]))
    }

    fn bump(&mut self) {
        self.pos += 1;
    }

    /// Boolean chain, left-associative; all operators share one
    /// precedence level as in the CQL grammar.
    fn expr(&mut self, reports: &mut Reports) -> Option<QueryNode> {
        self.depth += 1;
        if self.depth > super::MAX_NESTING {
            reports.error(status::QUERY_TOO_COMPLEX, super::NESTING_ERROR);
            return None;
        }
        let node = self.expr_inner(reports);
        self.depth -= 1;
        node
    }

    fn expr_inner(&mut self, reports: &mut Reports) -> Option<QueryNode> {
        let mut left = self.clause(reports)?;
        while let Some((Tok::Word, word)) = self.peek() {
            let word = word.to_string();
            let (base, modifiers) = split_modifiers(&word);
            match base.to_ascii_lowercase().as_str() {
                "and" => {
                    self.bump();
                    check_boolean_modifiers(&modifiers, reports);
                    let right = self.clause(reports)?;
                    left = and_group(left, right);
                }
                "or" => {
                    self.bump();
                    check_boolean_modifiers(&modifiers, reports);
                    let right = self.clause(reports)?;
                    left = Group::disjunction(vec![left, right]).into();
                }
                "not" | "prox" => {
                    reports.error(
                        status::UNKNOWN_QUERY_ELEMENT,
                        "SRU diagnostic 48: Only basic search including term-only \
                         and boolean (AND,OR) operator queries are currently supported.",
                    );
                    return None;
                }
                _ => break,
            }
        }
        Some(left)
    }

    fn clause(&mut self, reports: &mut Reports) -> Option<QueryNode> {
        match self.peek() {
            Some((Tok::ParenOpen, _)) => {
                self.bump();
                let inner = self.expr(reports)?;
                match self.peek() {
                    Some((Tok::ParenClose, _)) => self.bump(),
                    _ => {
                        reports.error(status::MALFORMED_QUERY, PARSE_ERROR);
                        return None;
                    }
                }
                Some(inner)
            }
            Some((Tok::Quoted | Tok::Word, _)) => self.term_clause(reports),
            _ => {
                reports.error(status::MALFORMED_QUERY, PARSE_ERROR);
                None
            }
        }
    }

    /// A run of terms up to the next operator or parenthesis. Exactly
    /// three items with a relation word in the middle form an index
    /// clause (`words = "Haus"`); anything else is an implicit phrase.
    fn term_clause(&mut self, reports: &mut Reports) -> Option<QueryNode> {
        let mut items: Vec<(String, bool)> = Vec::new();
        while let Some((kind, text)) = self.peek() {
            match kind {
                Tok::Word => {
                    let (base, _) = split_modifiers(text);
                    let lowered = base.to_ascii_lowercase();
                    if matches!(lowered.as_str(), "and" | "or" | "not" | "prox") {
                        break;
                    }
                    items.push((text.to_string(), false));
                    self.bump();
                }
                Tok::Quoted => {
                    match literal::unquote(text) {
                        Some(content) => items.push((content, true)),
                        None => {
                            reports.error(status::MALFORMED_QUERY, PARSE_ERROR);
                            return None;
                        }
                    }
                    self.bump();
                }
                _ => break,
            }
        }

        if items.len() == 3 && !items[1].1 {
            let (relation, _) = split_modifiers(&items[1].0);
            if KNOWN_RELATIONS.contains(&relation) {
                return self.index_clause(&items[0].0, &items[1].0, &items[2].0, reports);
            }
        }

        let words: Vec<&str> = items
            .iter()
            .flat_map(|(text, _)| text.split(' '))
            .filter(|w| !w.is_empty())
            .collect();
        phrase(&words, reports)
    }

    fn index_clause(
        &mut self,
        index: &str,
        relation: &str,
        term: &str,
        reports: &mut Reports,
    ) -> Option<QueryNode> {
        if !SUPPORTED_INDEXES.contains(&index) {
            reports.error(
                status::UNSUPPORTED_SRU_FEATURE,
                format!("SRU diagnostic 16: Index {index} is not supported."),
            );
        }
        let (base, modifiers) = split_modifiers(relation);
        if !SUPPORTED_RELATIONS.contains(&base) {
            reports.error(
                status::UNSUPPORTED_SRU_FEATURE,
                format!("SRU diagnostic 19: Relation {base} is not supported."),
            );
        }
        if let Some(modifier) = modifiers.first() {
            reports.error(
                status::UNSUPPORTED_SRU_FEATURE,
                format!(
                    "SRU diagnostic 20: Relation modifier {} is not supported.",
                    render_modifier(modifier)
                ),
            );
        }
        let words: Vec<&str> = term.split(' ').filter(|w| !w.is_empty()).collect();
        phrase(&words, reports)
    }
}

/// One word becomes a token, several an ordered phrase sequence.
fn phrase(words: &[&str], reports: &mut Reports) -> Option<QueryNode> {
    match words {
        [] => {
            reports.error(
                status::NO_QUERY,
                "SRU diagnostic 27: An empty term is unsupported.",
            );
            None
        }
        [word] => Some(token(word)),
        _ => Some(Group::sequence(words.iter().map(|w| token(w)).collect()).into()),
    }
}

fn token(word: &str) -> QueryNode {
    QueryNode::token(Term::new("orth", word))
}

/// `AND` means co-occurrence within one sentence, encoded as an
/// unordered sequence with a zero sentence distance.
fn and_group(left: QueryNode, right: QueryNode) -> QueryNode {
    Group::Sequence {
        operands: vec![left, right],
        in_order: Some(false),
        distances: vec![Distance::new(DistanceKey::Sentence, Boundary::fixed(0))],
    }
    .into()
}

/// Split `or/rel.combine=sum` into the operator and its modifiers.
fn split_modifiers(word: &str) -> (&str, Vec<&str>) {
    let mut parts = word.split('/');
    let base = parts.next().unwrap_or(word);
    (base, parts.collect())
}

fn check_boolean_modifiers(modifiers: &[&str], reports: &mut Reports) {
    if let Some(modifier) = modifiers.first() {
        reports.error(
            status::UNSUPPORTED_SRU_FEATURE,
            format!(
                "SRU diagnostic 20: Relation modifier {} is not supported.",
                render_modifier(modifier)
            ),
        );
    }
}

/// Render `rel.combine=sum` the way SRU diagnostics spell it.
fn render_modifier(modifier: &str) -> String {
    modifier.replacen('=', " = ", 1)
}
