//! Relation-chain resolution.
//!
//! Source syntaxes like ANNIS QL declare operands once (`#1`, `#2`, ...)
//! and then constrain them with binary relations. A tree-shaped output
//! has no aliased nodes, so every operand reuse must be rewritten: the
//! first use of a multiply-referenced slot wraps its subtree in a fresh
//! class, and every later use stands in a `focus` reference over that
//! class, embedding the combined tree built so far.

use std::collections::HashMap;

use indexmap::IndexMap;
use koralq_core::status;
use koralq_core::{QueryNode, Reference, Reports};

use crate::classes::ClassAllocator;

/// One binary constraint over numbered operand slots. `text` is the
/// source rendering used in diagnostics.
#[derive(Debug, Clone)]
pub struct Constraint<C> {
    pub left: u32,
    pub right: u32,
    pub op: C,
    pub text: String,
}

/// A combined subtree together with the slots it contains.
struct Component {
    root: QueryNode,
    slots: Vec<u32>,
}

struct SlotState {
    total: u32,
    processed: u32,
    class: Option<u32>,
}

/// Resolve a constraint set into one nested tree. `build` combines two
/// resolved operands under a constraint's operation.
///
/// Constraints are processed in source order; a constraint none of
/// whose operands has been seen yet (while others have) is deferred and
/// retried once after the rest. An undrained queue, or operands left in
/// disconnected components, reports `UNBOUND_ANNIS_RELATION` and yields
/// no query.
pub fn resolve<C>(
    slots: IndexMap<u32, QueryNode>,
    constraints: Vec<Constraint<C>>,
    classes: &mut ClassAllocator,
    reports: &mut Reports,
    mut build: impl FnMut(&C, QueryNode, QueryNode, &mut ClassAllocator, &mut Reports) -> Option<QueryNode>,
) -> Option<QueryNode> {
    if constraints.is_empty() {
        let mut trees = slots.into_values();
        let first = trees.next();
        if trees.next().is_some() {
            reports.error(
                status::UNBOUND_ANNIS_RELATION,
                "The operands are not bound by any relation.",
            );
            return None;
        }
        return first;
    }

    let mut states: HashMap<u32, SlotState> = HashMap::new();
    for constraint in &constraints {
        for slot in [constraint.left, constraint.right] {
            states
                .entry(slot)
                .or_insert(SlotState { total: 0, processed: 0, class: None })
                .total += 1;
        }
    }

    let mut trees: IndexMap<u32, QueryNode> = slots;
    let mut components: Vec<Component> = Vec::new();
    let mut queue: Vec<Constraint<C>> = Vec::new();
    let mut started = false;

    for constraint in constraints {
        if started && is_unanchored(&constraint, &states) {
            queue.push(constraint);
            continue;
        }
        started = true;
        if !apply(&constraint, &mut trees, &mut states, &mut components, classes, reports, &mut build) {
            return None;
        }
    }

    // One reordering pass over the deferred constraints.
    let retry: Vec<Constraint<C>> = std::mem::take(&mut queue);
    for constraint in retry {
        if is_unanchored(&constraint, &states) {
            reports.error(
                status::UNBOUND_ANNIS_RELATION,
                format!("The relation {} is not bound to any other relations.", constraint.text),
            );
            return None;
        }
        if !apply(&constraint, &mut trees, &mut states, &mut components, classes, reports, &mut build) {
            return None;
        }
    }

    if components.len() != 1 {
        reports.error(
            status::UNBOUND_ANNIS_RELATION,
            "The query contains relations over disjoint operands.",
        );
        return None;
    }
    components.pop().map(|c| c.root)
}

/// True when neither operand has been consumed by a prior constraint.
fn is_unanchored<C>(constraint: &Constraint<C>, states: &HashMap<u32, SlotState>) -> bool {
    [constraint.left, constraint.right]
        .iter()
        .all(|slot| states.get(slot).is_none_or(|s| s.processed == 0))
}

fn apply<C>(
    constraint: &Constraint<C>,
    trees: &mut IndexMap<u32, QueryNode>,
    states: &mut HashMap<u32, SlotState>,
    components: &mut Vec<Component>,
    classes: &mut ClassAllocator,
    reports: &mut Reports,
    build: &mut impl FnMut(&C, QueryNode, QueryNode, &mut ClassAllocator, &mut Reports) -> Option<QueryNode>,
) -> bool {
    let mut slots = vec![constraint.left, constraint.right];
    let Some(left) =
        retrieve(constraint.left, &constraint.text, trees, states, components, classes, reports, &mut slots)
    else {
        return false;
    };
    let Some(right) =
        retrieve(constraint.right, &constraint.text, trees, states, components, classes, reports, &mut slots)
    else {
        return false;
    };
    let Some(root) = build(&constraint.op, left, right, classes, reports) else {
        return false;
    };
    // The new component absorbs the slot sets of everything it embedded,
    // so a later constraint can still locate operands buried inside it.
    components.push(Component { root, slots });
    true
}

/// Resolve one operand slot, class-wrapping on first shared use and
/// emitting a focus reference (absorbing the enclosing component) on
/// every later use.
#[allow(clippy::too_many_arguments)]
fn retrieve(
    slot: u32,
    text: &str,
    trees: &mut IndexMap<u32, QueryNode>,
    states: &mut HashMap<u32, SlotState>,
    components: &mut Vec<Component>,
    classes: &mut ClassAllocator,
    reports: &mut Reports,
    absorbed: &mut Vec<u32>,
) -> Option<QueryNode> {
    let Some(state) = states.get_mut(&slot) else {
        reports.error(
            status::UNBOUND_ANNIS_RELATION,
            format!("The relation {text} is not bound to any other relations."),
        );
        return None;
    };
    state.processed += 1;

    if state.processed > 1 {
        let class = state.class.unwrap_or(ClassAllocator::FIRST_INTERNAL);
        let mut reference = Reference::focus(class);
        if let Some(pos) = components.iter().position(|c| c.slots.contains(&slot)) {
            let component = components.remove(pos);
            absorbed.extend(component.slots);
            reference.operands.push(component.root);
        }
        return Some(reference.into());
    }

    let Some(tree) = trees.shift_remove(&slot) else {
        reports.error(
            status::UNBOUND_ANNIS_RELATION,
            format!("The relation {text} is not bound to any other relations."),
        );
        return None;
    };
    if state.total > 1 {
        let (class, wrapped) = classes.wrap_fresh(tree);
        state.class = Some(class);
        return Some(wrapped);
    }
    Some(tree)
}
