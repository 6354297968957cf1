// Test-tier resolution: which cases a judging run executes, in order

use arena_common::types::{Challenge, EdgeCategory, Mode, TestCase, Tier};

/// A case tagged with the tier it came from
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ResolvedCase<'a> {
    pub tier: Tier,
    /// Only set for edge-tier cases
    pub category: Option<EdgeCategory>,
    pub case: &'a TestCase,
}

/// Quick-run gets the visible tier; submit gets visible, hidden, then edge.
/// Authoring order within each tier is preserved.
pub fn resolve(challenge: &Challenge, mode: Mode) -> Vec<ResolvedCase<'_>> {
    let suite = &challenge.test_cases;
    let visible = suite.visible.iter().map(|case| ResolvedCase {
        tier: Tier::Visible,
        category: None,
        case,
    });

    match mode {
        Mode::Run => visible.collect(),
        Mode::Submit => visible
            .chain(suite.hidden.iter().map(|case| ResolvedCase {
                tier: Tier::Hidden,
                category: None,
                case,
            }))
            .chain(suite.edge.iter().map(|edge| ResolvedCase {
                tier: Tier::Edge,
                category: Some(edge.category),
                case: &edge.case,
            }))
            .collect(),
    }
}
