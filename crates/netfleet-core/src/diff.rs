//! Line-set diff between a captured live config and a rendered desired
//! config.
//!
//! The diff is deliberately coarse and context-free: both texts are
//! reduced to unordered sets of significant lines, and the delta is plain
//! set difference. A line that is byte-identical under two different parent
//! blocks is treated as unchanged even though it logically is a different
//! statement; see `test_identical_leaf_lines_under_different_parents`.
//!
//! Pure and cheap. A diff is valid only at the instant its two input
//! snapshots were captured; callers recompute rather than cache.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

/// Device output that is never part of the configuration proper.
const NOISE_PREFIXES: &[&str] = &["Building configuration", "Current configuration"];

/// The line-level delta between two config snapshots.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfigDiff {
    /// Lines present in the desired config but not in the live config.
    pub to_add: BTreeSet<String>,

    /// Lines present in the live config but not in the desired config.
    pub to_remove: BTreeSet<String>,
}

impl ConfigDiff {
    /// Whether the two snapshots agree on every significant line.
    pub fn is_empty(&self) -> bool {
        self.to_add.is_empty() && self.to_remove.is_empty()
    }

    /// Compact "+N / -M" form for reports and log lines.
    pub fn summary(&self) -> String {
        format!("+{} / -{}", self.to_add.len(), self.to_remove.len())
    }

    /// Human-readable rendering, adds first then removes.
    pub fn render(&self) -> String {
        if self.is_empty() {
            return "no significant differences".to_string();
        }
        let mut out = String::new();
        if !self.to_add.is_empty() {
            out.push_str("lines to add:\n");
            for line in &self.to_add {
                out.push_str(&format!("  + {}\n", line));
            }
        }
        if !self.to_remove.is_empty() {
            out.push_str("lines to remove:\n");
            for line in &self.to_remove {
                out.push_str(&format!("  - {}\n", line));
            }
        }
        out
    }
}

/// Reduce config text to its set of significant lines.
///
/// Blank lines, `!` comment/separator lines and device banner noise are
/// discarded; leading whitespace is preserved because indentation is part
/// of the statement.
fn significant_lines(text: &str) -> BTreeSet<String> {
    text.lines()
        .map(|line| line.trim_end())
        .filter(|line| {
            let stripped = line.trim_start();
            !stripped.is_empty()
                && !stripped.starts_with('!')
                && !NOISE_PREFIXES.iter().any(|p| stripped.starts_with(p))
        })
        .map(|line| line.to_string())
        .collect()
}

/// Compute the delta between a live config and a desired config.
pub fn diff_configs(live: &str, desired: &str) -> ConfigDiff {
    let live_lines = significant_lines(live);
    let desired_lines = significant_lines(desired);

    ConfigDiff {
        to_add: desired_lines.difference(&live_lines).cloned().collect(),
        to_remove: live_lines.difference(&desired_lines).cloned().collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_diff_of_identical_text_is_empty() {
        let text = "hostname R1\ninterface Gi2\n ip address 10.0.0.1 255.255.255.252\n";
        let diff = diff_configs(text, text);
        assert!(diff.is_empty());
        assert_eq!(diff.summary(), "+0 / -0");
    }

    #[test]
    fn test_literal_set_difference() {
        let live = "a\nb\nc\n";
        let desired = "b\nc\nd\n";
        let diff = diff_configs(live, desired);
        assert_eq!(
            diff.to_add.iter().collect::<Vec<_>>(),
            vec![&"d".to_string()]
        );
        assert_eq!(
            diff.to_remove.iter().collect::<Vec<_>>(),
            vec![&"a".to_string()]
        );
    }

    #[test]
    fn test_blank_and_comment_lines_are_ignored() {
        let live = "hostname R1\n!\n! section marker\n\n";
        let desired = "hostname R1\n";
        assert!(diff_configs(live, desired).is_empty());
    }

    #[test]
    fn test_banner_noise_is_ignored() {
        let live = "Building configuration...\nCurrent configuration : 4096 bytes\nhostname R1\n";
        let desired = "hostname R1\n";
        assert!(diff_configs(live, desired).is_empty());
    }

    #[test]
    fn test_indentation_distinguishes_lines() {
        let live = " ip address 10.0.0.1 255.255.255.252\n";
        let desired = "ip address 10.0.0.1 255.255.255.252\n";
        let diff = diff_configs(live, desired);
        assert_eq!(diff.to_add.len(), 1);
        assert_eq!(diff.to_remove.len(), 1);
    }

    // The known blind spot of flat line-set diffing: an indented statement
    // that is byte-identical under two different parent blocks reads as
    // unchanged even when it moved between blocks.
    #[test]
    fn test_identical_leaf_lines_under_different_parents() {
        let live = "interface Gi2\n description uplink\ninterface Gi3\n";
        let desired = "interface Gi2\ninterface Gi3\n description uplink\n";
        let diff = diff_configs(live, desired);
        assert!(
            diff.is_empty(),
            "flat set semantics treat the moved description as unchanged"
        );
    }

    #[test]
    fn test_render_orders_adds_before_removes() {
        let diff = diff_configs("old line\n", "new line\n");
        let rendered = diff.render();
        let add = rendered.find("+ new line").unwrap();
        let remove = rendered.find("- old line").unwrap();
        assert!(add < remove);
    }
}
