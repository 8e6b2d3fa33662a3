// 🎯 Store Matcher - Resolve a scraped store name to one roster entry
//
// Tiers are tried in order, least lossy first. Each tier scans the whole
// roster before the next one is tried; the first tier with a hit wins.
//
//   1. exact literal
//   2. exact on normalize()
//   3. exact on remove_bracket_chars()
//   4. exact on strip_bracket_content()
//   5. substring (either direction) on normalize(), smallest length difference
//   6. substring (either direction) on remove_bracket_chars(), smallest length difference
//
// For tiers 5 and 6 an exact tie on length difference goes to the entry that
// comes first in the roster.

use crate::normalize::{normalize, remove_bracket_chars, strip_bracket_content};
use serde::{Deserialize, Serialize};

// ============================================================================
// ROSTER ENTRY
// ============================================================================

/// Anything that carries a canonical store name
pub trait RosterEntry {
    fn name(&self) -> &str;
}

impl RosterEntry for String {
    fn name(&self) -> &str {
        self
    }
}

impl RosterEntry for &str {
    fn name(&self) -> &str {
        self
    }
}

// ============================================================================
// MATCH TIER
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MatchTier {
    ExactLiteral,
    ExactNormalized,
    ExactBracketCharsRemoved,
    ExactBracketContentStripped,
    ContainsNormalized,
    ContainsBracketCharsRemoved,
}

impl MatchTier {
    pub fn as_str(&self) -> &'static str {
        match self {
            MatchTier::ExactLiteral => "exact",
            MatchTier::ExactNormalized => "exact (normalized)",
            MatchTier::ExactBracketCharsRemoved => "exact (bracket chars removed)",
            MatchTier::ExactBracketContentStripped => "exact (bracket content stripped)",
            MatchTier::ContainsNormalized => "contains (normalized)",
            MatchTier::ContainsBracketCharsRemoved => "contains (bracket chars removed)",
        }
    }

    /// True for tiers that only require substring containment
    pub fn is_partial(&self) -> bool {
        matches!(
            self,
            MatchTier::ContainsNormalized | MatchTier::ContainsBracketCharsRemoved
        )
    }
}

#[derive(Debug, Clone, Copy)]
pub struct StoreMatch<'a, T> {
    pub entry: &'a T,
    pub tier: MatchTier,
}

// ============================================================================
// STRATEGIES
// ============================================================================

/// A strategy returns the roster index it resolved, if any
type Strategy = fn(&str, &[&str]) -> Option<usize>;

const STRATEGIES: [(MatchTier, Strategy); 6] = [
    (MatchTier::ExactLiteral, exact_literal),
    (MatchTier::ExactNormalized, exact_normalized),
    (MatchTier::ExactBracketCharsRemoved, exact_bracket_chars_removed),
    (MatchTier::ExactBracketContentStripped, exact_bracket_content_stripped),
    (MatchTier::ContainsNormalized, contains_normalized),
    (MatchTier::ContainsBracketCharsRemoved, contains_bracket_chars_removed),
];

fn exact_literal(scraped: &str, names: &[&str]) -> Option<usize> {
    names.iter().position(|n| *n == scraped)
}

fn exact_normalized(scraped: &str, names: &[&str]) -> Option<usize> {
    exact_by_key(normalize, scraped, names)
}

fn exact_bracket_chars_removed(scraped: &str, names: &[&str]) -> Option<usize> {
    exact_by_key(remove_bracket_chars, scraped, names)
}

fn exact_bracket_content_stripped(scraped: &str, names: &[&str]) -> Option<usize> {
    exact_by_key(strip_bracket_content, scraped, names)
}

fn contains_normalized(scraped: &str, names: &[&str]) -> Option<usize> {
    closest_containing(normalize, scraped, names)
}

fn contains_bracket_chars_removed(scraped: &str, names: &[&str]) -> Option<usize> {
    closest_containing(remove_bracket_chars, scraped, names)
}

fn exact_by_key(key: fn(&str) -> String, scraped: &str, names: &[&str]) -> Option<usize> {
    let target = key(scraped);
    names.iter().position(|n| key(n) == target)
}

/// Among entries whose key contains, or is contained in, the scraped key,
/// pick the one with the smallest length difference (first one on a tie).
fn closest_containing(key: fn(&str) -> String, scraped: &str, names: &[&str]) -> Option<usize> {
    let target = key(scraped);
    let target_len = target.chars().count();
    let mut best: Option<(usize, usize)> = None;

    for (idx, name) in names.iter().enumerate() {
        let candidate = key(name);
        if !(target.contains(candidate.as_str()) || candidate.contains(target.as_str())) {
            continue;
        }

        let diff = target_len.abs_diff(candidate.chars().count());
        if best.map_or(true, |(_, best_diff)| diff < best_diff) {
            best = Some((idx, diff));
        }
    }

    best.map(|(idx, _)| idx)
}

// ============================================================================
// PUBLIC API
// ============================================================================

/// Resolve `scraped` against `roster`, reporting which tier matched
pub fn match_with_tier<'a, T: RosterEntry>(scraped: &str, roster: &'a [T]) -> Option<StoreMatch<'a, T>> {
    let names: Vec<&str> = roster.iter().map(RosterEntry::name).collect();

    STRATEGIES.iter().find_map(|(tier, strategy)| {
        strategy(scraped, &names).map(|idx| StoreMatch {
            entry: &roster[idx],
            tier: *tier,
        })
    })
}

/// Best roster entry for a scraped store name, or `None`
pub fn find_best_match<'a, T: RosterEntry>(scraped: &str, roster: &'a [T]) -> Option<&'a T> {
    match_with_tier(scraped, roster).map(|m| m.entry)
}

// ============================================================================
// TESTS
// ============================================================================
