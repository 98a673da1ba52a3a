//! COSMAS II front end.
//!
//! COSMAS II is an infix language: operands are wordforms, lemma
//! expressions, `MORPH(...)` annotation bundles, and structure elements,
//! combined by `und`/`oder`/`nicht`, proximity operators (`/+w1:4,s0`),
//! and the containment pair `#IN`/`#OV`. The operator bodies have a
//! lexical life of their own (proximity specs, option lists, regular
//! expressions), so the parser re-reads them from the source text
//! instead of forcing everything through one token grammar.
//!
//! All binary operators associate to the right; parentheses override.

use logos::Logos;

use koralq_core::status;
use koralq_core::{
    Boundary, ClassRefCheck, ClassRefOp, DistanceKey, Frame, Group, Match, QueryNode, Reference,
    Reports, Term, TermExpr, TermGroup, TermRelation, TermType,
};

use super::Compilation;
use crate::classes::ClassAllocator;
use crate::distance::{self, Proximity};
use crate::frames;
use crate::literal;

const PARSE_ERROR: &str = "Could not parse query.";
const MORPH_ERROR: &str = "Something went wrong parsing the argument in MORPH().";
const ELEM_EMPTY: &str =
    "Empty #ELEM() operator. Please specify a valid element key (like 's' for sentence).";

#[derive(Logos, Debug, Clone, Copy, PartialEq, Eq)]
#[logos(skip r"[ \t\r\n]+")]
enum Tok {
    #[token("(")]
    ParenOpen,

    #[token(")")]
    ParenClose,

    #[token(",")]
    Comma,

    #[token(":")]
    Colon,

    #[token("/")]
    Slash,

    #[token("%")]
    Percent,

    #[regex(r"#[A-Za-z]+")]
    Operator,

    #[regex(r#""(?:[^"\\]|\\.)*""#)]
    Quoted,

    // Wordforms carry umlauts, `$`, `&`, wildcards, and escaped
    // punctuation; everything structural is excluded from the class.
    #[regex(r#"(?:[^\s(),:/%#'"\\]|\\.)+"#, priority = 3)]
    Word,

    // Leftover characters (stray quotes, lone backslashes) only occur
    // inside operator bodies, which are re-read from the source.
    #[regex(r".", priority = 1)]
    Raw,
}

/// How a proximity group wraps its two operands.
#[derive(Debug, Clone, Copy)]
enum ProxWrap {
    /// Both operands share one freshly allocated class, so a chained
    /// proximity can re-expose the pair one level up.
    Shared,
    /// No class wrap (operand of `#BEG`/`#END`/`#ALL`/`#NHIT`).
    Plain,
    /// Externally assigned classes, one per operand (`#NHIT`).
    Pair(u32, u32),
}

pub fn compile(query: &str, reports: &mut Reports) -> Compilation {
    if query.trim().is_empty() {
        reports.error(status::NO_QUERY, "The query is empty.");
        return Compilation::empty();
    }
    let Some(tokens) = lex(query, reports) else {
        return Compilation::empty();
    };
    let mut parser = Parser {
        source: query,
        tokens,
        pos: 0,
        in_all: false,
        depth: 0,
    };
    let mut classes = ClassAllocator::new();

    let node = parser.expr(ProxWrap::Shared, &mut classes, reports);
    if parser.pos < parser.tokens.len() {
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
    /// Inside `#ALL(...)`: proximity operands stay unclassed in the
    /// whole subtree.
    in_all: bool,
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

    /// Raw text between the parenthesis at the cursor and its matching
    /// close, without consuming anything. Returns the body and the
    /// offset of the closing parenthesis.
    fn paren_body(&self) -> Option<(String, usize)> {
        let (kind, span) = self.tokens.get(self.pos)?;
        if *kind != Tok::ParenOpen {
            return None;
        }
        let open = span.start;
        let mut depth = 0usize;
        for (i, c) in self.source[open..].char_indices() {
            match c {
                '(' => depth += 1,
                ')' => {
                    depth -= 1;
                    if depth == 0 {
                        let close = open + i;
                        return Some((self.source[open + 1..close].to_string(), close));
                    }
                }
                _ => {}
            }
        }
        None
    }

    /// Advance past every token that ends at or before `offset` + 1
    /// (i.e. consume a raw region including the character at `offset`).
    fn skip_past(&mut self, offset: usize) {
        while self.pos < self.tokens.len() && self.tokens[self.pos].1.start <= offset {
            self.pos += 1;
        }
    }

    /// Consume a parenthesized operator body as raw text.
    fn operator_body(&mut self) -> Option<String> {
        let (body, close) = self.paren_body()?;
        self.skip_past(close);
        Some(body)
    }

    /// The option text of a proximity operator: everything from the
    /// character after `/` or `%` up to the next blank or parenthesis.
    fn proximity_spec(&mut self) -> String {
        let span = self.tokens[self.pos].1.clone();
        let start = span.end;
        let mut end = self.source.len();
        for (i, c) in self.source[start..].char_indices() {
            if c.is_whitespace() || c == '(' || c == ')' {
                end = start + i;
                break;
            }
        }
        self.bump();
        while self.pos < self.tokens.len() && self.tokens[self.pos].1.end <= end {
            self.pos += 1;
        }
        self.source[start..end].to_string()
    }

    /// One expression: an operand sequence, optionally joined to the
    /// rest of the query by a binary operator. `wrap` governs how a
    /// proximity operator at this level classes its operands.
    fn expr(
        &mut self,
        wrap: ProxWrap,
        classes: &mut ClassAllocator,
        reports: &mut Reports,
    ) -> Option<QueryNode> {
        self.depth += 1;
        if self.depth > super::MAX_NESTING {
            reports.error(status::QUERY_TOO_COMPLEX, super::NESTING_ERROR);
            return None;
        }
        let node = self.expr_inner(wrap, classes, reports);
        self.depth -= 1;
        node
    }

    fn expr_inner(
        &mut self,
        wrap: ProxWrap,
        classes: &mut ClassAllocator,
        reports: &mut Reports,
    ) -> Option<QueryNode> {
        let left = self.sequence(classes, reports)?;

        match self.peek_text() {
            Some((Tok::Word, text)) if text.eq_ignore_ascii_case("oder") => {
                self.bump();
                let right = self.expr(ProxWrap::Shared, classes, reports)?;
                Some(Group::disjunction(vec![left, right]).into())
            }
            Some((Tok::Word, text)) if text.eq_ignore_ascii_case("und") => {
                self.bump();
                let right = self.expr(ProxWrap::Shared, classes, reports)?;
                Some(cooccurrence(left, right, false))
            }
            Some((Tok::Word, text)) if text.eq_ignore_ascii_case("nicht") => {
                self.bump();
                let right = self.expr(ProxWrap::Shared, classes, reports)?;
                Some(cooccurrence(left, right, true))
            }
            Some((kind @ (Tok::Slash | Tok::Percent), _)) => {
                let spec = self.proximity_spec();
                let prox = distance::parse_proximity(&spec, kind == Tok::Percent, reports)?;
                // The class is issued before the right-hand side parses,
                // so an outer chain level numbers below its inner one.
                let pair = if self.in_all {
                    None
                } else {
                    match wrap {
                        ProxWrap::Plain => None,
                        ProxWrap::Shared => {
                            let c = classes.allocate();
                            Some((c, c))
                        }
                        ProxWrap::Pair(a, b) => Some((a, b)),
                    }
                };
                let right = self.expr(ProxWrap::Shared, classes, reports)?;
                Some(proximity_group(prox, left, right, pair))
            }
            Some((Tok::Operator, text)) if text.eq_ignore_ascii_case("#IN") => {
                self.bump();
                let opts = self.containment_options();
                let right = self.expr(ProxWrap::Shared, classes, reports)?;
                self.containment(false, &opts, left, right, classes, reports)
            }
            Some((Tok::Operator, text)) if text.eq_ignore_ascii_case("#OV") => {
                self.bump();
                let opts = self.containment_options();
                let right = self.expr(ProxWrap::Shared, classes, reports)?;
                self.containment(true, &opts, left, right, classes, reports)
            }
            _ => Some(left),
        }
    }

    /// One or more adjacent operands, flattened into a single sequence.
    fn sequence(
        &mut self,
        classes: &mut ClassAllocator,
        reports: &mut Reports,
    ) -> Option<QueryNode> {
        let mut operands = vec![self.unit(classes, reports)?];
        while self.starts_unit() {
            operands.push(self.unit(classes, reports)?);
        }
        if operands.len() == 1 {
            operands.pop()
        } else {
            Some(Group::sequence(operands).into())
        }
    }

    fn starts_unit(&self) -> bool {
        match self.peek_text() {
            Some((Tok::Word, text)) => {
                !matches!(text.to_ascii_lowercase().as_str(), "und" | "oder" | "nicht")
            }
            Some((Tok::Quoted | Tok::ParenOpen, _)) => true,
            Some((Tok::Operator, text)) => !matches!(
                text.to_ascii_uppercase().as_str(),
                "#IN" | "#OV"
            ),
            _ => false,
        }
    }

    fn unit(&mut self, classes: &mut ClassAllocator, reports: &mut Reports) -> Option<QueryNode> {
        match self.peek_text() {
            Some((Tok::ParenOpen, _)) => {
                self.bump();
                let node = self.expr(ProxWrap::Shared, classes, reports)?;
                if !self.eat(Tok::ParenClose) {
                    reports.error(status::MALFORMED_QUERY, PARSE_ERROR);
                    return None;
                }
                Some(node)
            }
            Some((Tok::Quoted, text)) => {
                let body = literal::unquote(text)?;
                self.bump();
                self.maybe_conditions(wordform(&body, reports)?, classes, reports)
            }
            Some((Tok::Operator, text)) => {
                let name = text.to_ascii_uppercase();
                self.bump();
                match name.as_str() {
                    "#ELEM" => self.elem(reports),
                    "#REG" => self.reg(reports),
                    "#BEG" => self.edge_focus(0, classes, reports),
                    "#END" => self.edge_focus(-1, classes, reports),
                    "#ALL" => self.all(classes, reports),
                    "#NHIT" => self.nhit(classes, reports),
                    "#BED" | "#COND" => self.bed(classes, reports),
                    other => {
                        reports.error(
                            status::UNKNOWN_QUERY_ELEMENT,
                            format!("Unknown operator '{other}'."),
                        );
                        None
                    }
                }
            }
            Some((Tok::Word, text)) => {
                let raw = text.to_string();
                self.bump();
                if raw.starts_with('<') && raw.ends_with('>') && raw.len() > 2 {
                    return Some(QueryNode::span(raw[1..raw.len() - 1].to_string()));
                }
                if raw.eq_ignore_ascii_case("MORPH") && self.peek() == Some(Tok::ParenOpen) {
                    let body = self.operator_body().or_else(|| {
                        reports.error(status::MALFORMED_QUERY, PARSE_ERROR);
                        None
                    })?;
                    return morph(&body, reports);
                }
                self.maybe_conditions(wordform(&raw, reports)?, classes, reports)
            }
            _ => {
                reports.error(status::MALFORMED_QUERY, PARSE_ERROR);
                None
            }
        }
    }

    /// The colon shorthand for position conditions (`der:sa,-pa`).
    fn maybe_conditions(
        &mut self,
        node: QueryNode,
        classes: &mut ClassAllocator,
        reports: &mut Reports,
    ) -> Option<QueryNode> {
        if self.peek() != Some(Tok::Colon) {
            return Some(node);
        }
        self.bump();
        let conditions = self.condition_list(reports)?;
        self.bed_group(node, &conditions, classes, reports)
    }

    /// `#BEG(x)` / `#END(x)`: focus on the first/last token of the
    /// operand. A directly contained proximity stays unclassed.
    fn edge_focus(
        &mut self,
        start: i32,
        classes: &mut ClassAllocator,
        reports: &mut Reports,
    ) -> Option<QueryNode> {
        if !self.eat(Tok::ParenOpen) {
            reports.error(status::MALFORMED_QUERY, PARSE_ERROR);
            return None;
        }
        let inner = self.expr(ProxWrap::Plain, classes, reports)?;
        if !self.eat(Tok::ParenClose) {
            reports.error(status::MALFORMED_QUERY, PARSE_ERROR);
            return None;
        }
        Some(Reference::span_focus(start, Some(1), inner).into())
    }

    fn all(&mut self, classes: &mut ClassAllocator, reports: &mut Reports) -> Option<QueryNode> {
        if !self.eat(Tok::ParenOpen) {
            reports.error(status::MALFORMED_QUERY, PARSE_ERROR);
            return None;
        }
        let outer = self.in_all;
        self.in_all = true;
        let inner = self.expr(ProxWrap::Plain, classes, reports);
        self.in_all = outer;
        let inner = inner?;
        if !self.eat(Tok::ParenClose) {
            reports.error(status::MALFORMED_QUERY, PARSE_ERROR);
            return None;
        }
        Some(inner)
    }

    /// `#NHIT(x /prox y)`: inverts the distance gap between the two
    /// operands and focuses it, so the match is everything between the
    /// pair rather than the pair itself.
    fn nhit(&mut self, classes: &mut ClassAllocator, reports: &mut Reports) -> Option<QueryNode> {
        if !self.eat(Tok::ParenOpen) {
            reports.error(status::MALFORMED_QUERY, PARSE_ERROR);
            return None;
        }
        let gap = classes.allocate();
        let first = classes.allocate();
        let second = classes.allocate();
        let inner = self.expr(ProxWrap::Pair(first, second), classes, reports)?;
        if !self.eat(Tok::ParenClose) {
            reports.error(status::MALFORMED_QUERY, PARSE_ERROR);
            return None;
        }
        let inversion =
            Group::class_ref_op(ClassRefOp::Inversion, vec![first, second], gap, inner);
        Some(Reference::focus_on(gap, inversion.into()).into())
    }

    /// `#BED(x, conditions)`: positional conditions on `x` relative to
    /// enclosing structure spans.
    fn bed(&mut self, classes: &mut ClassAllocator, reports: &mut Reports) -> Option<QueryNode> {
        if !self.eat(Tok::ParenOpen) {
            reports.error(status::MALFORMED_QUERY, PARSE_ERROR);
            return None;
        }
        let node = self.expr(ProxWrap::Shared, classes, reports)?;
        if !self.eat(Tok::Comma) {
            reports.error(status::MALFORMED_QUERY, PARSE_ERROR);
            return None;
        }
        let conditions = self.condition_list(reports)?;
        if !self.eat(Tok::ParenClose) {
            reports.error(status::MALFORMED_QUERY, PARSE_ERROR);
            return None;
        }
        self.bed_group(node, &conditions, classes, reports)
    }

    /// Comma-separated `[+-]?[spt][ae]` conditions; a `/` switches from
    /// hit-begin to hit-end mode.
    fn condition_list(&mut self, reports: &mut Reports) -> Option<Vec<(bool, String)>> {
        let mut conditions = Vec::new();
        let mut end_mode = false;
        loop {
            match self.peek_text() {
                Some((Tok::Word, text)) if is_condition(text) => {
                    conditions.push((end_mode, text.to_string()));
                    self.bump();
                }
                _ => {
                    reports.error(status::MALFORMED_QUERY, PARSE_ERROR);
                    return None;
                }
            }
            match self.peek_text() {
                Some((Tok::Comma, _)) if self.condition_follows(1) => self.bump(),
                Some((Tok::Slash, _)) if self.condition_follows(1) => {
                    self.bump();
                    end_mode = true;
                }
                _ => break,
            }
        }
        Some(conditions)
    }

    fn condition_follows(&self, offset: usize) -> bool {
        match self.tokens.get(self.pos + offset) {
            Some((Tok::Word, span)) => is_condition(&self.source[span.clone()]),
            _ => false,
        }
    }

    fn bed_group(
        &mut self,
        node: QueryNode,
        conditions: &[(bool, String)],
        classes: &mut ClassAllocator,
        reports: &mut Reports,
    ) -> Option<QueryNode> {
        // The first condition's class doubles as the focus target.
        let focus = classes.allocate();
        let mut cond_classes = vec![focus];
        for _ in 1..conditions.len() {
            cond_classes.push(classes.allocate());
        }
        let mut groups = Vec::new();
        for ((end_mode, text), class) in conditions.iter().zip(&cond_classes) {
            groups.push(position_condition(*end_mode, text, *class, &node, reports)?);
        }

        // Additional conditions nest under matches-groups; each level
        // past the first re-focuses its condition's class.
        let mut current = groups.pop()?;
        let len = groups.len();
        for i in (1..=len).rev() {
            let inner = Group::position(vec![Frame::Matches], vec![groups.pop()?, current]);
            current = if i > 1 {
                Reference::focus_on(cond_classes[i - 1], inner.into()).into()
            } else {
                inner.into()
            };
        }
        Some(Reference::focus_on(focus, current).into())
    }

    /// Options of `#IN`/`#OV`. A parenthesis that does not read as an
    /// option list is left alone and parses as the right operand.
    fn containment_options(&mut self) -> Vec<String> {
        let Some((body, close)) = self.paren_body() else {
            return Vec::new();
        };
        let opts: Vec<String> = body
            .split(',')
            .map(|o| o.trim().to_ascii_uppercase())
            .filter(|o| !o.is_empty())
            .collect();
        let known = |o: &str| {
            matches!(
                o,
                "L" | "R" | "F" | "FE" | "FI" | "N" | "X" | "%" | "ALL" | "HIT" | "MAX" | "MIN"
            )
        };
        if opts.is_empty() || !opts.iter().all(|o| known(o.as_str())) {
            return Vec::new();
        }
        self.skip_past(close);
        opts
    }

    fn containment(
        &mut self,
        overlap: bool,
        opts: &[String],
        left: QueryNode,
        right: QueryNode,
        classes: &mut ClassAllocator,
        reports: &mut Reports,
    ) -> Option<QueryNode> {
        let mut position: Option<String> = None;
        let mut exclusion = false;
        let mut all = false;
        let mut grouping = false;
        for opt in opts {
            match opt.as_str() {
                "%" => exclusion = true,
                "ALL" => all = true,
                "HIT" => {}
                "MAX" | "MIN" => grouping = true,
                letter => position = Some(letter.to_string()),
            }
        }

        let operator = if overlap { "#OV" } else { "#IN" };
        let mapping = if overlap {
            frames::map_ov(position.as_deref())
        } else {
            frames::map_in(position.as_deref())
        };
        let Some(mapping) = mapping else {
            reports.error(
                status::UNKNOWN_QUERY_ELEMENT,
                format!(
                    "Unknown option '{}' in {operator}().",
                    position.as_deref().unwrap_or("")
                ),
            );
            return None;
        };
        let frame_set = mapping.frames;
        let mut check = mapping.check;
        if exclusion {
            if overlap {
                check = vec![ClassRefCheck::Disjoint];
            } else {
                // Negating containment negates an attached span-identity
                // check as well.
                for c in check.iter_mut() {
                    *c = match *c {
                        ClassRefCheck::Equals => ClassRefCheck::Differs,
                        ClassRefCheck::Differs => ClassRefCheck::Equals,
                        other => other,
                    };
                }
            }
        }

        let classed = overlap || !check.is_empty() || grouping || all;
        let (mut first, mut second) = (left, right);
        let mut class_in = Vec::new();
        let mut container = 0;
        if classed {
            let c1 = classes.allocate();
            let c2 = classes.allocate();
            class_in = vec![c1, c2];
            container = c2;
            first = Group::class(c1, first).into();
            second = Group::class(c2, second).into();
        }

        let (frame_set, operands) = if grouping {
            // Longest-match grouping turns the relation around: the
            // container becomes the primary operand and gets focused.
            let inverted = frame_set.into_iter().map(frames::invert).collect();
            (inverted, vec![second, first])
        } else {
            (frame_set, vec![first, second])
        };

        let mut node: QueryNode = if exclusion && !overlap {
            Group::Exclusion { operands, frames: frame_set }.into()
        } else {
            Group::Position { operands, frames: frame_set }.into()
        };
        if !check.is_empty() {
            node = Group::class_ref_check(check, class_in.clone(), node).into();
        }
        if all && !overlap {
            let merged = classes.allocate();
            node = Group::class_ref_op(ClassRefOp::Delete, vec![container], merged, node).into();
        }
        if grouping {
            let focused = Reference::focus_on(container, node).into();
            node = Group::Merge { operands: vec![focused] }.into();
        } else if overlap {
            let union = classes.allocate();
            node = Group::class_ref_op(ClassRefOp::Union, class_in, union, node).into();
        }
        Some(node)
    }

    /// `#ELEM(...)`: a structure span, optionally constrained by
    /// foundry/layer or attribute comparisons.
    fn elem(&mut self, reports: &mut Reports) -> Option<QueryNode> {
        let Some(body) = self.operator_body() else {
            reports.error(status::MALFORMED_QUERY, PARSE_ERROR);
            return None;
        };
        if body.trim().is_empty() {
            reports.error(status::MALFORMED_QUERY, ELEM_EMPTY);
            return None;
        }
        let fields = elem_fields(&body)?;
        let mut iter = fields.into_iter().peekable();

        let element = match iter.next() {
            Some(ElemField::Text { text, .. }) => text,
            _ => {
                reports.error(status::MALFORMED_QUERY, PARSE_ERROR);
                return None;
            }
        };
        let mut node = if matches!(iter.peek(), Some(ElemField::Op(Match::Eq))) {
            // `foundry/layer=key` addressing instead of a plain element.
            iter.next();
            let key = match iter.next() {
                Some(ElemField::Text { text, .. }) => text,
                _ => {
                    reports.error(status::MALFORMED_QUERY, PARSE_ERROR);
                    return None;
                }
            };
            let mut term = Term::default();
            match element.split_once('/') {
                Some((foundry, layer)) => {
                    term.foundry = Some(foundry.to_string());
                    term.layer = Some(layer.to_string());
                }
                None => term.layer = Some(element),
            }
            term.key = Some(key);
            QueryNode::Span { wrap: Some(term.into()), attr: None }
        } else {
            QueryNode::span(element.to_lowercase())
        };

        let mut attrs: Vec<TermExpr> = Vec::new();
        while let Some(field) = iter.next() {
            let name = match field {
                ElemField::Text { text, .. } => text,
                _ => {
                    reports.error(status::MALFORMED_QUERY, PARSE_ERROR);
                    return None;
                }
            };
            let m = match iter.next() {
                Some(ElemField::Op(m)) => m,
                _ => {
                    reports.error(status::MALFORMED_QUERY, PARSE_ERROR);
                    return None;
                }
            };
            let (value, quoted) = match iter.next() {
                Some(ElemField::Text { text, quoted }) => (text, quoted),
                _ => {
                    reports.error(status::MALFORMED_QUERY, PARSE_ERROR);
                    return None;
                }
            };
            let layer = attribute_layer(&name);
            let values: Vec<&str> = if quoted {
                value.split_whitespace().collect()
            } else {
                vec![value.as_str()]
            };
            let mut terms: Vec<TermExpr> = values
                .iter()
                .map(|v| Term::new(layer.clone(), v.to_string()).with_match(m).into())
                .collect();
            attrs.push(if terms.len() == 1 {
                terms.pop().unwrap_or_else(|| Term::default().into())
            } else {
                TermGroup::new(TermRelation::And, terms).into()
            });
        }
        if !attrs.is_empty() {
            let attr = if attrs.len() == 1 {
                attrs.pop()
            } else {
                Some(TermGroup::new(TermRelation::And, attrs).into())
            };
            if let QueryNode::Span { attr: slot, .. } = &mut node {
                *slot = attr;
            }
        }
        Some(node)
    }

    /// `#REG(expr)`: a regular expression over surface forms, with
    /// optional single or double quoting around the pattern.
    fn reg(&mut self, reports: &mut Reports) -> Option<QueryNode> {
        let Some(body) = self.operator_body() else {
            reports.error(status::MALFORMED_QUERY, PARSE_ERROR);
            return None;
        };
        let body = body.trim();
        if body.is_empty() {
            reports.error(
                status::MALFORMED_QUERY,
                "Failing to parse the regular expression in #REG().",
            );
            return None;
        }
        let inner = strip_reg_quotes(body);
        let pattern = unescape_quotes(inner);
        Some(QueryNode::token(
            Term::new("orth", pattern).with_type(TermType::Regex),
        ))
    }
}

/// `und`/`nicht`: co-occurrence in the same text, encoded as an
/// unordered zero-width text distance, excluding for `nicht`.
fn cooccurrence(left: QueryNode, right: QueryNode, exclude: bool) -> QueryNode {
    let mut d = koralq_core::Distance::cosmas(DistanceKey::Text, Boundary::new(0, Some(0)));
    d.exclude = exclude;
    Group::Sequence {
        operands: vec![left, right],
        in_order: Some(false),
        distances: vec![d],
    }
    .into()
}

fn proximity_group(
    prox: Proximity,
    left: QueryNode,
    right: QueryNode,
    pair: Option<(u32, u32)>,
) -> QueryNode {
    let (mut left, mut right) = (left, right);
    if let Some((a, b)) = pair {
        left = Group::class(a, left).into();
        right = Group::class(b, right).into();
    }
    let operands = if prox.inverted {
        vec![right, left]
    } else {
        vec![left, right]
    };
    let mut node: QueryNode = Group::Sequence {
        operands,
        in_order: Some(prox.in_order),
        distances: prox.distances,
    }
    .into();
    if prox.grouping {
        node = Group::Merge { operands: vec![node] }.into();
    }
    node
}

/// A wordform or `&lemma` operand. `$` asks for case-insensitive
/// matching; wildcards are only valid on the surface layer.
fn wordform(raw: &str, reports: &mut Reports) -> Option<QueryNode> {
    let mut text = raw;
    let mut insensitive = false;
    if let Some(stripped) = text.strip_prefix('$') {
        insensitive = true;
        text = stripped;
    }

    if let Some(lemma) = text.strip_prefix('&') {
        let body = literal::unescape(lemma);
        // Only the part after the last `&` is the lemma proper; the
        // options segment before it may carry anything.
        let tail = body.rsplit('&').next().unwrap_or(&body);
        if literal::has_wildcards(tail) {
            reports.error(
                status::ERR_LEM_WILDCARDS,
                format!("Wildcards are not allowed in the lemma of a lemma expression: '{raw}'."),
            );
            return None;
        }
        if body.is_empty() {
            reports.error(status::MALFORMED_QUERY, PARSE_ERROR);
            return None;
        }
        let mut term = Term::new("lemma", body);
        if insensitive {
            term = term.case_insensitive();
        }
        return Some(QueryNode::token(term));
    }

    let body = literal::unescape(text);
    if body.is_empty() {
        reports.error(status::MALFORMED_QUERY, PARSE_ERROR);
        return None;
    }
    let mut term = Term::new("orth", body.clone());
    if literal::has_wildcards(&body) {
        term = term.with_type(TermType::Wildcard);
    }
    if insensitive {
        term = term.case_insensitive();
    }
    Some(QueryNode::token(term))
}

/// `MORPH(a & b & ...)`: each `&`-separated part is one annotation
/// term of the form `foundry/layer=key:value`, all parts conjoined.
fn morph(body: &str, reports: &mut Reports) -> Option<QueryNode> {
    let compact: String = body.chars().filter(|c| !c.is_whitespace()).collect();
    if compact.is_empty() {
        reports.error(status::INCOMPATIBLE_OPERATOR_AND_OPERAND, MORPH_ERROR);
        return None;
    }
    let mut terms: Vec<TermExpr> = Vec::new();
    for part in compact.split('&') {
        terms.push(morph_term(part, reports)?.into());
    }
    Some(match terms.len() {
        1 => QueryNode::Token { wrap: terms.pop() },
        _ => QueryNode::token(TermGroup::new(TermRelation::And, terms)),
    })
}

fn morph_term(text: &str, reports: &mut Reports) -> Option<Term> {
    let report = |reports: &mut Reports| {
        reports.error(status::INCOMPATIBLE_OPERATOR_AND_OPERAND, MORPH_ERROR);
    };

    let mut rest = text;
    let mut foundry = None;
    if let Some((f, r)) = rest.split_once('/') {
        if f.is_empty() || !f.chars().all(word_char) {
            report(reports);
            return None;
        }
        foundry = Some(f.to_string());
        rest = r;
    }

    // An optional layer ends at `=` or `!=`; a quoted key starts
    // immediately, so the scan below leaves it alone.
    let mut layer = None;
    let mut polarity = Match::Eq;
    let word_len: usize = rest
        .chars()
        .take_while(|c| word_char(*c))
        .map(char::len_utf8)
        .sum();
    let after = &rest[word_len..];
    if let Some(r) = after.strip_prefix("!=") {
        polarity = Match::Ne;
        layer = (word_len > 0).then(|| rest[..word_len].to_string());
        rest = r;
    } else if let Some(r) = after.strip_prefix('=') {
        layer = (word_len > 0).then(|| rest[..word_len].to_string());
        rest = r;
    }

    let Some((key, key_quoted, r)) = morph_segment(rest) else {
        report(reports);
        return None;
    };
    rest = r;
    let mut value = None;
    let mut value_quoted = false;
    if let Some(r) = rest.strip_prefix(':') {
        let Some((v, q, r)) = morph_segment(r) else {
            report(reports);
            return None;
        };
        value = Some(v);
        value_quoted = q;
        rest = r;
    }
    if !rest.is_empty() {
        report(reports);
        return None;
    }

    let mut term = Term::default();
    term.foundry = foundry;
    term.layer = layer;
    term.key = Some(key);
    term.value = value;
    term.match_op = Some(polarity);
    if key_quoted || value_quoted {
        term.term_type = Some(TermType::Regex);
    }
    Some(term)
}

/// One key or value segment: a word, or a double-quoted regex.
fn morph_segment(rest: &str) -> Option<(String, bool, &str)> {
    if let Some(r) = rest.strip_prefix('"') {
        let end = r.find('"')?;
        return Some((r[..end].to_string(), true, &r[end + 1..]));
    }
    let len: usize = rest
        .chars()
        .take_while(|c| word_char(*c))
        .map(char::len_utf8)
        .sum();
    if len == 0 {
        return None;
    }
    Some((rest[..len].to_string(), false, &rest[len..]))
}

fn word_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_'
}

/// Attribute names carry legacy COSMAS descriptors; `ANA` is the
/// part-of-speech layer.
fn attribute_layer(name: &str) -> String {
    match name.to_ascii_uppercase().as_str() {
        "ANA" => "p".to_string(),
        _ => name.to_string(),
    }
}

#[derive(Debug)]
enum ElemField {
    Text { text: String, quoted: bool },
    Op(Match),
}

/// Split an `#ELEM` body into names, comparison operators, and
/// (possibly quoted, possibly multi-valued) values.
fn elem_fields(body: &str) -> Option<Vec<ElemField>> {
    let mut fields = Vec::new();
    let mut chars = body.chars().peekable();
    while let Some(&c) = chars.peek() {
        if c.is_whitespace() {
            chars.next();
        } else if c == '\'' {
            chars.next();
            let mut text = String::new();
            loop {
                match chars.next() {
                    Some('\'') => break,
                    Some(c) => text.push(c),
                    None => return None,
                }
            }
            fields.push(ElemField::Text { text, quoted: true });
        } else if c == '=' {
            chars.next();
            fields.push(ElemField::Op(Match::Eq));
        } else if c == '!' {
            chars.next();
            if chars.next() != Some('=') {
                return None;
            }
            fields.push(ElemField::Op(Match::Ne));
        } else {
            let mut text = String::new();
            while let Some(&c) = chars.peek() {
                if c.is_whitespace() || matches!(c, '=' | '!' | '\'') {
                    break;
                }
                text.push(c);
                chars.next();
            }
            fields.push(ElemField::Text { text, quoted: false });
        }
    }
    Some(fields)
}

/// `[+-]?[spt][ae]`
fn is_condition(text: &str) -> bool {
    let rest = text.strip_prefix(['+', '-']).unwrap_or(text);
    let mut chars = rest.chars();
    matches!(
        (chars.next(), chars.next(), chars.next()),
        (Some('s' | 'p' | 't'), Some('a' | 'e'), None)
    )
}

/// One `#BED` condition against the element named by its first letter.
/// Same-edge conditions map to a frame; opposite-edge conditions pin
/// single tokens of hit and element onto each other via span focus.
fn position_condition(
    end_mode: bool,
    text: &str,
    class: u32,
    node: &QueryNode,
    reports: &mut Reports,
) -> Option<QueryNode> {
    let mut rest = text;
    let mut negated = false;
    if let Some(r) = rest.strip_prefix('-') {
        negated = true;
        rest = r;
    } else if let Some(r) = rest.strip_prefix('+') {
        rest = r;
    }
    let mut chars = rest.chars();
    let (elem, edge) = match (chars.next(), chars.next()) {
        (Some(e @ ('s' | 'p' | 't')), Some(d @ ('a' | 'e'))) => (e, d),
        _ => {
            reports.error(status::MALFORMED_QUERY, PARSE_ERROR);
            return None;
        }
    };

    let span = QueryNode::span(elem.to_string());
    let classed: QueryNode = Group::class(class, node.clone()).into();
    let (frame_set, span_refs) = match (end_mode, edge) {
        (false, 'a') => (vec![Frame::StartsWith], None),
        (false, _) => (vec![Frame::Matches], Some((0, -1))),
        (true, 'e') => (vec![Frame::EndsWith], None),
        (true, _) => (vec![Frame::Matches], Some((-1, 0))),
    };
    let operands = match span_refs {
        Some((hit_start, elem_start)) => vec![
            Reference::span_focus(elem_start, Some(1), span).into(),
            Reference::span_focus(hit_start, Some(1), classed).into(),
        ],
        None => vec![span, classed],
    };
    let group = if negated {
        Group::Exclusion { operands, frames: frame_set }
    } else {
        Group::Position { operands, frames: frame_set }
    };
    Some(group.into())
}

/// Strip one pair of matching single or double quotes around a `#REG`
/// pattern; unmatched quotes stay part of the pattern.
fn strip_reg_quotes(body: &str) -> &str {
    for quote in ['\'', '"'] {
        if body.len() >= 2 && body.starts_with(quote) && body.ends_with(quote) {
            return &body[1..body.len() - 1];
        }
    }
    body
}

/// Only quote escapes resolve inside a regex; everything else (and a
/// trailing lone backslash) is part of the pattern.
fn unescape_quotes(body: &str) -> String {
    let mut out = String::with_capacity(body.len());
    let mut chars = body.chars().peekable();
    while let Some(c) = chars.next() {
        if c == '\\' && matches!(chars.peek(), Some('\'' | '"')) {
            continue;
        }
        out.push(c);
    }
    out
}
