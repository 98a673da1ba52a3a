//! Position frames and class-reference predicates.

/// Canonical containment/overlap/alignment predicate between two spans.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Frame {
    Matches,
    AlignsLeft,
    AlignsRight,
    StartsWith,
    EndsWith,
    OverlapsLeft,
    OverlapsRight,
    IsAround,
    IsWithin,
}

impl Frame {
    pub fn as_str(self) -> &'static str {
        match self {
            Frame::Matches => "frames:matches",
            Frame::AlignsLeft => "frames:alignsLeft",
            Frame::AlignsRight => "frames:alignsRight",
            Frame::StartsWith => "frames:startsWith",
            Frame::EndsWith => "frames:endsWith",
            Frame::OverlapsLeft => "frames:overlapsLeft",
            Frame::OverlapsRight => "frames:overlapsRight",
            Frame::IsAround => "frames:isAround",
            Frame::IsWithin => "frames:isWithin",
        }
    }
}

/// Set relation required to hold between two classed spans.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClassRefCheck {
    Intersects,
    Equals,
    Differs,
    Unequals,
    Includes,
    Disjoint,
}

impl ClassRefCheck {
    pub fn as_str(self) -> &'static str {
        match self {
            ClassRefCheck::Intersects => "classRefCheck:intersects",
            ClassRefCheck::Equals => "classRefCheck:equals",
            ClassRefCheck::Differs => "classRefCheck:differs",
            ClassRefCheck::Unequals => "classRefCheck:unequals",
            ClassRefCheck::Includes => "classRefCheck:includes",
            ClassRefCheck::Disjoint => "classRefCheck:disjoint",
        }
    }
}

/// How multiple classed spans combine into one output span.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClassRefOp {
    Union,
    Intersection,
    Delete,
    Merge,
    Inversion,
}

impl ClassRefOp {
    pub fn as_str(self) -> &'static str {
        match self {
            ClassRefOp::Union => "classRefOp:union",
            ClassRefOp::Intersection => "classRefOp:intersection",
            ClassRefOp::Delete => "classRefOp:delete",
            ClassRefOp::Merge => "classRefOp:merge",
            ClassRefOp::Inversion => "classRefOp:inversion",
        }
    }
}
