// 🧹 Ranking Filter - Coarse pre-filter before best-match resolution
//
// Keeps a scraped row when ANY target name is related to it. Looser than the
// matcher on purpose: it may admit rows the matcher later fails to resolve
// (those are logged as unmatched), but it never drops a row the matcher could
// resolve against the same names.

use crate::normalize::{normalize, remove_bracket_chars, strip_bracket_content};
use crate::scraper::ScrapedRanking;

/// Either string contains the other
fn mutually_contains(a: &str, b: &str) -> bool {
    a.contains(b) || b.contains(a)
}

/// Is `scraped_name` plausibly one of the target stores?
pub fn is_target_store(scraped_name: &str, target: &str) -> bool {
    if scraped_name == target {
        return true;
    }

    let keys: [fn(&str) -> String; 3] = [normalize, strip_bracket_content, remove_bracket_chars];
    keys.iter()
        .any(|key| mutually_contains(&key(scraped_name), &key(target)))
}

/// Rows whose store name relates to at least one target name
pub fn filter_rankings_for_stores<S: AsRef<str>>(
    rankings: Vec<ScrapedRanking>,
    target_names: &[S],
) -> Vec<ScrapedRanking> {
    rankings
        .into_iter()
        .filter(|ranking| {
            target_names
                .iter()
                .any(|target| is_target_store(&ranking.store_name, target.as_ref()))
        })
        .collect()
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::matcher::find_best_match;
    use crate::scraper::ScrapedPoint;
    use chrono::NaiveDate;

    fn row(name: &str) -> ScrapedRanking {
        ScrapedRanking {
            store_name: name.to_string(),
            rankings: vec![ScrapedPoint {
                date: NaiveDate::from_ymd_opt(2025, 1, 10).unwrap(),
                value: 12.0,
            }],
        }
    }

    fn targets() -> Vec<&'static str> {
        vec![
            "TORIHADA SPA金山ルーム",
            "神のエステ 赤坂店",
            "sirena（シレーナ）",
            "Nocturne Spa〜ノクターンスパ〜",
            "椿～oil～ 下北沢ルーム",
        ]
    }

    #[test]
    fn test_keeps_related_rows() {
        let rows = vec![
            row("TORIHADA SPA（トリハダスパ）金山ルーム"),
            row("神のエステ 赤坂店"),
            row("sirena (シレーナ)"),
            row("Nocturne Spa"),
            row("Unrelated Salon"),
            row("Another Shop 渋谷"),
        ];

        let kept = filter_rankings_for_stores(rows, &targets());
        let names: Vec<&str> = kept.iter().map(|r| r.store_name.as_str()).collect();

        assert_eq!(
            names,
            vec![
                "TORIHADA SPA（トリハダスパ）金山ルーム",
                "神のエステ 赤坂店",
                "sirena (シレーナ)",
                "Nocturne Spa",
            ]
        );
    }

    #[test]
    fn test_empty_targets_keep_nothing() {
        let targets: Vec<String> = Vec::new();
        let kept = filter_rankings_for_stores(vec![row("sirena")], &targets);
        assert!(kept.is_empty());
    }

    #[test]
    fn test_bracket_chars_equivalence_is_kept() {
        // Equal only once bracket characters are removed
        assert!(is_target_store("a(b)c", "ab(c)"));
    }

    #[test]
    fn test_never_rejects_what_matcher_resolves() {
        let targets = targets();
        let probes = [
            "TORIHADA SPA（トリハダスパ）金山ルーム",
            "神のエステ（赤坂）",
            "神のエステ（赤坂店）",
            "SIRENA（シレーナ）",
            "Nocturne Spa～ノクターンスパ～",
            "椿（oil）下北沢ルーム",
            "椿 oil 下北沢ルーム",
            "a(b)c",
            "Unrelated Salon",
            "spa",
        ];

        for probe in &probes {
            let resolved = find_best_match(probe, &targets).is_some();
            let kept = targets.iter().any(|t| is_target_store(probe, t));
            if resolved {
                assert!(kept, "filter rejected a resolvable row: {}", probe);
            }
        }
    }
}
