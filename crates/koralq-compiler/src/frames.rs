//! Position frame mapping: containment/overlap operators and their
//! option letters to canonical frame sets plus class-reference checks.

use koralq_core::{ClassRefCheck, Frame};

/// Frame set and the set comparison it imposes on the two operands'
/// classes.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct FrameMapping {
    pub frames: Vec<Frame>,
    pub check: Vec<ClassRefCheck>,
}

impl FrameMapping {
    fn frames(frames: Vec<Frame>) -> Self {
        FrameMapping { frames, check: Vec::new() }
    }

    fn with_check(frames: Vec<Frame>, check: Vec<ClassRefCheck>) -> Self {
        FrameMapping { frames, check }
    }
}

/// `#IN` option letter to frames. `None` input is the bare operator.
/// Unknown options map to `None`.
pub fn map_in(option: Option<&str>) -> Option<FrameMapping> {
    let mapping = match option {
        None => FrameMapping::frames(vec![
            Frame::Matches,
            Frame::AlignsLeft,
            Frame::AlignsRight,
            Frame::IsWithin,
        ]),
        Some("L") => FrameMapping::frames(vec![Frame::AlignsLeft]),
        Some("R") => FrameMapping::frames(vec![Frame::AlignsRight]),
        Some("F") => FrameMapping::frames(vec![Frame::Matches]),
        Some("N") => FrameMapping::frames(vec![Frame::IsWithin]),
        Some("FE") => {
            FrameMapping::with_check(vec![Frame::Matches], vec![ClassRefCheck::Equals])
        }
        Some("FI") => {
            FrameMapping::with_check(vec![Frame::Matches], vec![ClassRefCheck::Differs])
        }
        Some(_) => return None,
    };
    Some(mapping)
}

/// `#OV` option letter to frames; every overlap variant carries at
/// least the `intersects` check.
pub fn map_ov(option: Option<&str>) -> Option<FrameMapping> {
    let mapping = match option {
        None => FrameMapping::with_check(
            vec![
                Frame::OverlapsLeft,
                Frame::OverlapsRight,
                Frame::IsAround,
                Frame::Matches,
            ],
            vec![ClassRefCheck::Intersects],
        ),
        Some("L") => FrameMapping::with_check(
            vec![Frame::StartsWith, Frame::OverlapsLeft],
            vec![ClassRefCheck::Intersects],
        ),
        Some("R") => FrameMapping::with_check(
            vec![Frame::EndsWith, Frame::OverlapsRight],
            vec![ClassRefCheck::Intersects],
        ),
        Some("F") => {
            FrameMapping::with_check(vec![Frame::Matches], vec![ClassRefCheck::Intersects])
        }
        Some("FE") => {
            FrameMapping::with_check(vec![Frame::Matches], vec![ClassRefCheck::Equals])
        }
        Some("FI") => FrameMapping::with_check(
            vec![Frame::Matches],
            vec![ClassRefCheck::Intersects, ClassRefCheck::Differs],
        ),
        Some("X") => {
            FrameMapping::with_check(vec![Frame::IsAround], vec![ClassRefCheck::Intersects])
        }
        Some(_) => return None,
    };
    Some(mapping)
}

/// Named position predicates used by the bracketing front ends
/// (`contains(x, y)`, `x within s`, ...). The span/container operand
/// comes first in the emitted position group.
pub fn named(predicate: &str) -> Option<Vec<Frame>> {
    let frames = match predicate {
        "contains" | "within" => vec![Frame::IsAround],
        "startswith" => vec![Frame::StartsWith],
        "endswith" => vec![Frame::EndsWith],
        "overlaps" => vec![Frame::OverlapsLeft, Frame::OverlapsRight],
        "matches" => vec![Frame::Matches],
        _ => return None,
    };
    Some(frames)
}

/// Frame inversion for `MAX` grouping, where the container becomes the
/// focused operand and the predicate flips around.
pub fn invert(frame: Frame) -> Frame {
    match frame {
        Frame::IsWithin => Frame::IsAround,
        Frame::IsAround => Frame::IsWithin,
        Frame::AlignsLeft => Frame::StartsWith,
        Frame::AlignsRight => Frame::EndsWith,
        Frame::StartsWith => Frame::AlignsLeft,
        Frame::EndsWith => Frame::AlignsRight,
        Frame::OverlapsLeft => Frame::OverlapsRight,
        Frame::OverlapsRight => Frame::OverlapsLeft,
        Frame::Matches => Frame::Matches,
    }
}
