//! Step lookup over the runtime tree.
//!
//! Steps hold no parent pointers. Lookups walk down from the root list,
//! descending into each statement's current nested steps.

use std::sync::Arc;

use crate::step::Step;

/// The root step list a step was initialized against.
#[derive(Clone)]
pub struct Scope {
    steps: Arc<[Arc<Step>]>,
}

impl Scope {
    pub fn new(steps: &[Arc<Step>]) -> Self {
        Self {
            steps: Arc::from(steps),
        }
    }

    pub fn steps(&self) -> &[Arc<Step>] {
        &self.steps
    }

    /// Statements enclosing `step`, outermost first. `None` if `step` is not
    /// in the tree.
    pub fn ancestors_of(&self, step: &Arc<Step>) -> Option<Vec<Arc<Step>>> {
        let mut trail = Vec::new();
        path_to(&self.steps, step, &mut trail).then_some(trail)
    }

    /// Find step `id` as seen from `requester`: first in the lists enclosing
    /// the requester, innermost first, then anywhere in the tree.
    pub fn find_step(&self, id: u32, requester: &Arc<Step>) -> Option<Arc<Step>> {
        let ancestors = self.ancestors_of(requester).unwrap_or_default();
        ancestors
            .iter()
            .rev()
            .find_map(|parent| parent.nested_steps().into_iter().find(|s| s.id() == id))
            .or_else(|| find_anywhere(&self.steps, id))
    }

    /// The nearest statement enclosing `requester`.
    pub fn find_parent(&self, requester: &Arc<Step>) -> Option<Arc<Step>> {
        self.ancestors_of(requester)?.pop()
    }
}

fn path_to(list: &[Arc<Step>], target: &Arc<Step>, trail: &mut Vec<Arc<Step>>) -> bool {
    for step in list {
        if Arc::ptr_eq(step, target) {
            return true;
        }
        let nested = step.nested_steps();
        if nested.is_empty() {
            continue;
        }
        trail.push(Arc::clone(step));
        if path_to(&nested, target, trail) {
            return true;
        }
        trail.pop();
    }
    false
}

/// Level by level: a list's own steps before anything nested in them.
fn find_anywhere(list: &[Arc<Step>], id: u32) -> Option<Arc<Step>> {
    if let Some(step) = list.iter().find(|s| s.id() == id) {
        return Some(Arc::clone(step));
    }
    list.iter()
        .find_map(|s| find_anywhere(&s.nested_steps(), id))
}
