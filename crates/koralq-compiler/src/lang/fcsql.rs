//! FCS-QL 2.0 front end (CLARIN Federated Content Search).
//!
//! Segments (`[pos = "NN"]`), implicit terms (`"Sonne"`), boolean
//! expressions inside segments, quantifiers, wildcard gaps, and
//! `within` scopes. Wildcard runs between two bound segments compile to
//! word distances on the enclosing sequence; additional gap runs nest
//! right into sub-sequences so every distance constrains exactly one
//! operand pair.

use logos::Logos;

use koralq_core::status;
use koralq_core::{
    Boundary, Distance, DistanceKey, Frame, Group, Match, QueryNode, Reports, Term, TermExpr,
    TermGroup, TermRelation, TermType,
};

use super::Compilation;

const SUPPORTED_FOUNDRIES: &[&str] = &["corenlp", "cnx", "opennlp", "tt", "mate", "xip"];

const FOUNDRY_OPENNLP: &str = "opennlp";
const FOUNDRY_TT: &str = "tt";

const PARSE_ERROR: &str = "FCS diagnostic 10: +Unexpected error while parsing query.";

#[derive(Logos, Debug, Clone, Copy, PartialEq, Eq)]
#[logos(skip r"[ \t\r\n]+")]
enum Tok {
    #[token("[")]
    BracketOpen,

    #[token("]")]
    BracketClose,

    #[token("(")]
    ParenOpen,

    #[token(")")]
    ParenClose,

    #[token("{")]
    BraceOpen,

    #[token("}")]
    BraceClose,

    #[token("|")]
    Pipe,

    #[token("&")]
    Amp,

    #[token("!=")]
    NotEquals,

    #[token("=")]
    Equals,

    #[token("!")]
    Bang,

    #[token("+")]
    Plus,

    #[token("*")]
    Star,

    #[token("?")]
    Question,

    #[token(",")]
    Comma,

    #[token(":")]
    Colon,

    /// Quoted regular expression with optional trailing flag letters.
    #[regex(r#""(?:[^"\\]|\\.)*"(?:/[a-zA-Z]+)?"#)]
    #[regex(r"'(?:[^'\\]|\\.)*'(?:/[a-zA-Z]+)?")]
    Regex,

    #[regex(r"[0-9]+")]
    Number,

    #[regex(r"[A-Za-z][A-Za-z0-9._\-]*")]
    Ident,
}

pub fn compile(query: &str, version: Option<&str>, reports: &mut Reports) -> Compilation {
    if !check_version(version, reports) {
        return Compilation::empty();
    }
    if query.trim().is_empty() {
        reports.error(status::NO_QUERY, "SRU diagnostic 1: No query has been passed.");
        return Compilation::empty();
    }
    let Some(tokens) = lex(query, reports) else {
        return Compilation::empty();
    };
    let mut parser = Parser { source: query, tokens, pos: 0, depth: 0 };
    let node = parser.query(reports);
    if node.is_some() && parser.pos < parser.tokens.len() {
        reports.error(status::UNKNOWN_QUERY_ERROR, PARSE_ERROR);
        return Compilation::empty();
    }
    match node {
        Some(node) => Compilation::query(node),
        None => {
            super::ensure_reported(reports, status::UNKNOWN_QUERY_ERROR, PARSE_ERROR);
            Compilation::empty()
        }
    }
}

/// FCS-QL is tied to SRU 2.0; both a missing and a different version
/// number abort the translation.
fn check_version(version: Option<&str>, reports: &mut Reports) -> bool {
    match version {
        None => {
            reports.error(
                status::MISSING_VERSION,
                "SRU diagnostic 7: Version number is missing.",
            );
            false
        }
        Some("2.0") => true,
        Some(_) => {
            reports.error(
                status::MISSING_VERSION,
                "SRU diagnostic 5: Only supports SRU version 2.0.",
            );
            false
        }
    }
}

fn lex(source: &str, reports: &mut Reports) -> Option<Vec<(Tok, std::ops::Range<usize>)>> {
    let mut tokens = Vec::new();
    let mut lexer = Tok::lexer(source);
    while let Some(result) = lexer.next() {
        match result {
            Ok(kind) => tokens.push((kind, lexer.span())),
            Err(()) => {
                reports.error(status::UNKNOWN_QUERY_ERROR, PARSE_ERROR);
                return None;
            }
        }
    }
    Some(tokens)
}

/// A sequence member before distance resolution: either a bound
/// segment or a wildcard gap with its occurrence bounds.
enum Item {
    Node(QueryNode),
    Gap(Boundary),
}

struct Parser<'s> {
    source: &'s str,
    tokens: Vec<(Tok, std::ops::Range<usize>)>,
    pos: usize,
    depth: usize,
}

impl Parser<'_> {
    fn peek(&self) -> Option<Tok> {
        self.tokens.get(self.pos).map(|(kind, _)| *kind)
    }

    fn peek_text(&self) -> Option<(Tok, &str)> {
        self.tokens
            .get(self.pos)
            .map(|(kind, span)| (*kind, &self.source[span.clone()]))
    }

    fn bump(&mut self) {
        self.pos += 1;
    }

    fn eat(&mut self, kind: Tok) -> bool {
        if self.peek() == Some(kind) {
            self.bump();
            true
        } else {
            false
        }
    }

    fn query(&mut self, reports: &mut Reports) -> Option<QueryNode> {
        let main = self.disjunction(reports)?;
        if let Some((Tok::Ident, "within")) = self.peek_text() {
            self.bump();
            let span = self.scope(reports)?;
            return Some(Group::position(vec![Frame::IsAround], vec![span, main]).into());
        }
        Some(main)
    }

    fn disjunction(&mut self, reports: &mut Reports) -> Option<QueryNode> {
        self.depth += 1;
        if self.depth > super::MAX_NESTING {
            reports.error(status::QUERY_TOO_COMPLEX, super::NESTING_ERROR);
            return None;
        }
        let node = self.disjunction_inner(reports);
        self.depth -= 1;
        node
    }

    fn disjunction_inner(&mut self, reports: &mut Reports) -> Option<QueryNode> {
        let mut operands = vec![self.sequence(reports)?];
        while self.eat(Tok::Pipe) {
            operands.push(self.sequence(reports)?);
        }
        if operands.len() == 1 {
            return operands.pop();
        }
        Some(Group::disjunction(operands).into())
    }

    fn sequence(&mut self, reports: &mut Reports) -> Option<QueryNode> {
        let mut items = Vec::new();
        loop {
            match self.peek_text() {
                Some((Tok::BracketOpen | Tok::ParenOpen | Tok::Regex, _)) => {
                    items.push(self.segment(reports)?);
                }
                Some((Tok::Ident, "within")) => break,
                _ => break,
            }
        }
        resolve_sequence(items, reports)
    }

    fn segment(&mut self, reports: &mut Reports) -> Option<Item> {
        match self.peek() {
            Some(Tok::BracketOpen) => {
                self.bump();
                if self.eat(Tok::BracketClose) {
                    // Wildcard segment; its quantifier widens the gap.
                    let bounds = self.quantifier(reports)?.unwrap_or(Boundary::fixed(1));
                    return Some(Item::Gap(bounds));
                }
                let wrap = self.expression(reports)?;
                if !self.eat(Tok::BracketClose) {
                    reports.error(status::UNKNOWN_QUERY_ERROR, PARSE_ERROR);
                    return None;
                }
                self.quantified(QueryNode::Token { wrap: Some(wrap) }, reports)
            }
            Some(Tok::ParenOpen) => {
                self.bump();
                let inner = self.disjunction(reports)?;
                if !self.eat(Tok::ParenClose) {
                    reports.error(status::UNKNOWN_QUERY_ERROR, PARSE_ERROR);
                    return None;
                }
                self.quantified(inner, reports)
            }
            Some(Tok::Regex) => {
                let term = self.regex_term(None, None, Match::Eq, reports)?;
                self.quantified(QueryNode::Token { wrap: Some(term) }, reports)
            }
            _ => {
                reports.error(status::UNKNOWN_QUERY_ERROR, PARSE_ERROR);
                None
            }
        }
    }

    fn quantified(&mut self, node: QueryNode, reports: &mut Reports) -> Option<Item> {
        match self.quantifier(reports)? {
            Some(bounds) if bounds != Boundary::fixed(1) => {
                Some(Item::Node(Group::repetition(bounds, node).into()))
            }
            _ => Some(Item::Node(node)),
        }
    }

    /// `+`, `*`, `?`, or `{n}`/`{n,}`/`{,m}`/`{n,m}`. `None` means no
    /// quantifier is present.
    fn quantifier(&mut self, reports: &mut Reports) -> Option<Option<Boundary>> {
        let bounds = match self.peek() {
            Some(Tok::Plus) => {
                self.bump();
                Boundary::new(1, None)
            }
            Some(Tok::Star) => {
                self.bump();
                Boundary::new(0, None)
            }
            Some(Tok::Question) => {
                self.bump();
                Boundary::new(0, Some(1))
            }
            Some(Tok::BraceOpen) => {
                self.bump();
                let min = self.number();
                let bounds = if self.eat(Tok::Comma) {
                    Boundary::new(min.unwrap_or(0), self.number())
                } else {
                    match min {
                        Some(n) => Boundary::fixed(n),
                        None => {
                            reports.error(status::UNKNOWN_QUERY_ERROR, PARSE_ERROR);
                            return None;
                        }
                    }
                };
                if !self.eat(Tok::BraceClose) {
                    reports.error(status::UNKNOWN_QUERY_ERROR, PARSE_ERROR);
                    return None;
                }
                bounds
            }
            _ => return Some(None),
        };
        Some(Some(bounds))
    }

    fn number(&mut self) -> Option<u32> {
        if let Some((Tok::Number, text)) = self.peek_text() {
            let value = text.parse().ok();
            self.bump();
            return value;
        }
        None
    }

    /// Boolean expression inside a segment; `|` binds weaker than `&`.
    fn expression(&mut self, reports: &mut Reports) -> Option<TermExpr> {
        let mut operands = vec![self.conjunction(reports)?];
        while self.eat(Tok::Pipe) {
            operands.push(self.conjunction(reports)?);
        }
        Some(fold_terms(TermRelation::Or, operands))
    }

    fn conjunction(&mut self, reports: &mut Reports) -> Option<TermExpr> {
        let mut operands = vec![self.unary(reports)?];
        while self.eat(Tok::Amp) {
            operands.push(self.unary(reports)?);
        }
        Some(fold_terms(TermRelation::And, operands))
    }

    fn unary(&mut self, reports: &mut Reports) -> Option<TermExpr> {
        self.depth += 1;
        if self.depth > super::MAX_NESTING {
            reports.error(status::QUERY_TOO_COMPLEX, super::NESTING_ERROR);
            return None;
        }
        let expr = self.unary_inner(reports);
        self.depth -= 1;
        expr
    }

    fn unary_inner(&mut self, reports: &mut Reports) -> Option<TermExpr> {
        if self.eat(Tok::Bang) {
            return Some(self.unary(reports)?.negate());
        }
        if self.eat(Tok::ParenOpen) {
            let inner = self.expression(reports)?;
            if !self.eat(Tok::ParenClose) {
                reports.error(status::UNKNOWN_QUERY_ERROR, PARSE_ERROR);
                return None;
            }
            return Some(inner);
        }
        self.attribute(reports)
    }

    /// `(qualifier:)? layer (= | !=) "regex"`.
    fn attribute(&mut self, reports: &mut Reports) -> Option<TermExpr> {
        let Some((Tok::Ident, first)) = self.peek_text() else {
            reports.error(status::UNKNOWN_QUERY_ERROR, PARSE_ERROR);
            return None;
        };
        let first = first.to_string();
        self.bump();

        let (qualifier, layer) = if self.eat(Tok::Colon) {
            let Some((Tok::Ident, layer)) = self.peek_text() else {
                reports.error(status::UNKNOWN_QUERY_ERROR, PARSE_ERROR);
                return None;
            };
            let layer = layer.to_string();
            self.bump();
            (Some(first), layer)
        } else {
            (None, first)
        };

        let polarity = match self.peek() {
            Some(Tok::Equals) => Match::Eq,
            Some(Tok::NotEquals) => Match::Ne,
            _ => {
                reports.error(status::UNKNOWN_QUERY_ERROR, PARSE_ERROR);
                return None;
            }
        };
        self.bump();

        self.regex_term(qualifier.as_deref(), Some(&layer), polarity, reports)
    }

    /// Build the koral term for one attribute constraint, resolving
    /// layer names, the default foundry, and the regex flags.
    fn regex_term(
        &mut self,
        qualifier: Option<&str>,
        layer: Option<&str>,
        polarity: Match,
        reports: &mut Reports,
    ) -> Option<TermExpr> {
        let Some((Tok::Regex, raw)) = self.peek_text() else {
            reports.error(status::UNKNOWN_QUERY_ERROR, PARSE_ERROR);
            return None;
        };
        let raw = raw.to_string();
        self.bump();

        let (pattern, flags) = split_flags(&raw);
        let Some(key) = strip_quotes(pattern) else {
            reports.error(status::UNKNOWN_QUERY_ERROR, PARSE_ERROR);
            return None;
        };

        let layer = match layer.unwrap_or("text") {
            "text" => "orth",
            "pos" => "p",
            "lemma" => "l",
            other => {
                reports.error(
                    status::UNKNOWN_QUERY_ELEMENT,
                    format!("SRU diagnostic 48: Layer {other} is unsupported."),
                );
                return None;
            }
        };

        let foundry = match qualifier {
            None => {
                if layer == "orth" {
                    FOUNDRY_OPENNLP
                } else {
                    FOUNDRY_TT
                }
            }
            Some(FOUNDRY_OPENNLP) if layer == "l" => {
                reports.error(
                    status::UNKNOWN_QUERY_ELEMENT,
                    "SRU diagnostic 48: Layer lemma with qualifier opennlp is unsupported.",
                );
                return None;
            }
            Some(q) if SUPPORTED_FOUNDRIES.contains(&q) => q,
            Some(q) => {
                reports.error(
                    status::UNKNOWN_QUERY_ELEMENT,
                    format!("SRU diagnostic 48: Qualifier {q} is unsupported."),
                );
                return None;
            }
        };

        let mut term = Term::new(layer, key)
            .with_foundry(foundry)
            .with_match(polarity)
            .with_type(TermType::Regex);
        if !self.apply_flags(&mut term, flags, reports) {
            return None;
        }
        Some(term.into())
    }

    /// `i`/`c` request case-insensitive matching, `I`/`C` the (default)
    /// sensitive one; the remaining grammar flags are diagnosed.
    fn apply_flags(&mut self, term: &mut Term, flags: &str, reports: &mut Reports) -> bool {
        let mut unsupported: Vec<&str> = Vec::new();
        for flag in flags.chars() {
            match flag {
                'i' | 'c' => *term = std::mem::take(term).case_insensitive(),
                'I' | 'C' => {}
                'l' => unsupported.push("LITERAL_MATCHING"),
                'd' => unsupported.push("IGNORE_DIACRITICS"),
                _ => {
                    reports.error(status::UNKNOWN_QUERY_ERROR, PARSE_ERROR);
                    return false;
                }
            }
        }
        match unsupported.len() {
            0 => true,
            1 => {
                reports.error(
                    status::UNKNOWN_QUERY_ELEMENT,
                    format!(
                        "SRU diagnostic 48: Regexflag: {} is unsupported.",
                        unsupported[0]
                    ),
                );
                false
            }
            _ => {
                reports.error(
                    status::UNKNOWN_QUERY_ELEMENT,
                    format!(
                        "SRU diagnostic 48: Regexflags: [{}] are unsupported.",
                        unsupported.join(", ")
                    ),
                );
                false
            }
        }
    }

    /// Scope identifier after `within`, mapped to a base structure span.
    fn scope(&mut self, reports: &mut Reports) -> Option<QueryNode> {
        let Some((Tok::Ident, scope)) = self.peek_text() else {
            reports.error(status::MALFORMED_QUERY, "Within context is missing.");
            return None;
        };
        let scope = scope.to_string();
        self.bump();
        let key = match scope.as_str() {
            "s" | "sentence" => "s",
            "p" | "paragraph" => "p",
            "t" | "text" => "t",
            other => {
                let name = match other {
                    "u" | "utterance" => "UTTERANCE",
                    "turn" => "TURN",
                    "session" => "SESSION",
                    _ => {
                        reports.error(status::UNKNOWN_QUERY_ERROR, PARSE_ERROR);
                        return None;
                    }
                };
                reports.error(
                    status::QUERY_TOO_COMPLEX,
                    format!("Within scope {name} is currently unsupported."),
                );
                return None;
            }
        };
        let term = Term {
            foundry: Some("base".into()),
            layer: Some("s".into()),
            key: Some(key.into()),
            ..Term::default()
        };
        Some(QueryNode::Span { wrap: Some(term.into()), attr: None })
    }
}

fn fold_terms(relation: TermRelation, mut operands: Vec<TermExpr>) -> TermExpr {
    if operands.len() == 1 {
        return operands.pop().unwrap_or_else(|| Term::default().into());
    }
    TermGroup::new(relation, operands).into()
}

/// Strip the term quotes without resolving regex escapes; the key is a
/// pattern and travels verbatim.
fn strip_quotes(raw: &str) -> Option<&str> {
    let quote = raw.chars().next()?;
    if !matches!(quote, '"' | '\'') || raw.len() < 2 || !raw.ends_with(quote) {
        return None;
    }
    Some(&raw[1..raw.len() - 1])
}

fn split_flags(raw: &str) -> (&str, &str) {
    match raw.rfind('/') {
        Some(idx) if idx > raw.rfind(['"', '\'']).unwrap_or(0) => {
            (&raw[..idx], &raw[idx + 1..])
        }
        _ => (raw, ""),
    }
}

/// Turn an interleaved segment/gap list into one sequence node. The
/// first gap becomes a distance constraint on the outer sequence; every
/// further gap folds its neighbours into a nested two-operand sequence.
fn resolve_sequence(items: Vec<Item>, reports: &mut Reports) -> Option<QueryNode> {
    let items = close_ends(items);
    let mut operands: Vec<QueryNode> = Vec::new();
    let mut outer: Option<Distance> = None;

    let mut iter = items.into_iter().peekable();
    while let Some(item) = iter.next() {
        match item {
            Item::Node(node) => operands.push(node),
            Item::Gap(mut bounds) => {
                // Merge immediately adjacent gaps.
                while let Some(Item::Gap(next)) = iter.peek() {
                    bounds = bounds.sum(*next);
                    iter.next();
                }
                let distance = Distance::new(DistanceKey::Word, bounds);
                let Some(Item::Node(next)) = iter.next() else {
                    reports.error(status::UNKNOWN_QUERY_ERROR, PARSE_ERROR);
                    return None;
                };
                match (&outer, operands.pop()) {
                    (None, Some(prev)) => {
                        outer = Some(distance);
                        operands.push(prev);
                        operands.push(next);
                    }
                    (Some(_), Some(prev)) => {
                        operands.push(
                            Group::Sequence {
                                operands: vec![prev, next],
                                in_order: Some(true),
                                distances: vec![distance],
                            }
                            .into(),
                        );
                    }
                    (_, None) => {
                        reports.error(status::UNKNOWN_QUERY_ERROR, PARSE_ERROR);
                        return None;
                    }
                }
            }
        }
    }

    match (operands.len(), outer) {
        (0, _) => {
            reports.error(status::UNKNOWN_QUERY_ERROR, PARSE_ERROR);
            None
        }
        (1, None) => operands.pop(),
        (_, None) => Some(Group::sequence(operands).into()),
        (_, Some(distance)) => Some(
            Group::Sequence {
                operands,
                in_order: Some(true),
                distances: vec![distance],
            }
            .into(),
        ),
    }
}

/// A gap at either end of a sequence has no second anchor; it stands
/// for quantified arbitrary tokens instead of a distance.
fn close_ends(items: Vec<Item>) -> Vec<Item> {
    let len = items.len();
    items
        .into_iter()
        .enumerate()
        .map(|(i, item)| match item {
            Item::Gap(bounds) if i == 0 || i == len - 1 => {
                if bounds == Boundary::fixed(1) {
                    Item::Node(QueryNode::any_token())
                } else {
                    Item::Node(Group::repetition(bounds, QueryNode::any_token()).into())
                }
            }
            other => other,
        })
        .collect()
}
