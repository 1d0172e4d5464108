//! Per-function profile trees
//!
//! A function's profile holds counts per source position plus one nested
//! profile per inlined call site:
//!
//! ```text
//! main                      total 120, head 3
//! ├─ 4:  count 20
//! ├─ 7:  count 0, targets { __prefetch_T0_0: 64 }
//! └─ 9:  parse (inlined)    total 100
//!        ├─ 2: count 60
//!        └─ 5: helper (inlined) total 40
//!               └─ 1: count 40
//! ```

use serde::Serialize;
use std::collections::BTreeMap;

use crate::domain::{InlineFrame, LineOffset, ProfileCount};

/// Counts observed at one source position
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PositionProfile {
    pub count: ProfileCount,
    /// Indirect call targets (and synthetic prefetch targets) by name
    pub targets: BTreeMap<String, ProfileCount>,
}

impl PositionProfile {
    fn merge(&mut self, other: PositionProfile) {
        self.count.accumulate(other.count);
        for (target, count) in other.targets {
            self.targets.entry(target).or_default().accumulate(count);
        }
    }
}

/// Call site of an inlined callee: position in the caller plus callee name
pub type CallsiteKey = (LineOffset, String);

/// Profile of one function, or of one inlined instance of a function
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FunctionProfile {
    pub total_count: u64,
    /// Samples at the function's entry address (top-level profiles only)
    pub head_count: u64,
    pub positions: BTreeMap<LineOffset, PositionProfile>,
    pub callsites: BTreeMap<CallsiteKey, FunctionProfile>,
}

impl FunctionProfile {
    /// Add `count` at the innermost frame of `stack`.
    ///
    /// `stack` is innermost first and its outermost frame is this function.
    /// Every profile along the path gets `count` added to its total.
    pub fn add_count(&mut self, stack: &[InlineFrame], count: u64) {
        let mut node = self;
        for pair in stack.windows(2).rev() {
            let (callee, caller) = (&pair[0], &pair[1]);
            node.total_count = node.total_count.saturating_add(count);
            node = node.callsites.entry((caller.offset(), callee.function.clone())).or_default();
        }
        node.total_count = node.total_count.saturating_add(count);
        if let Some(innermost) = stack.first() {
            let position = node.positions.entry(innermost.offset()).or_default();
            position.count.accumulate(ProfileCount::Execution(count));
        }
    }

    /// Position entry for the innermost frame of `stack`, created on demand.
    ///
    /// Totals are left untouched. Returns `None` for an empty stack.
    pub fn position_mut(&mut self, stack: &[InlineFrame]) -> Option<&mut PositionProfile> {
        let innermost = stack.first()?;
        let mut node = self;
        for pair in stack.windows(2).rev() {
            let (callee, caller) = (&pair[0], &pair[1]);
            node = node.callsites.entry((caller.offset(), callee.function.clone())).or_default();
        }
        Some(node.positions.entry(innermost.offset()).or_default())
    }

    /// Fold another profile of the same function into this one
    pub fn merge(&mut self, other: FunctionProfile) {
        self.total_count = self.total_count.saturating_add(other.total_count);
        self.head_count = self.head_count.saturating_add(other.head_count);
        for (offset, position) in other.positions {
            self.positions.entry(offset).or_default().merge(position);
        }
        for (key, callee) in other.callsites {
            self.callsites.entry(key).or_default().merge(callee);
        }
    }

    /// True if nothing has been recorded in this profile
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.total_count == 0 && self.positions.is_empty() && self.callsites.is_empty()
    }
}
