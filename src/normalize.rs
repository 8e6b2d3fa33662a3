// 🔤 Store Name Normalization
// Three comparison keys, from least to most aggressive.
//
// The portal uses brackets and wave dashes for two opposite purposes:
//   "神のエステ（赤羽）"             → bracket content IS the identity (location)
//   "TORIHADA SPA（トリハダスパ）金山ルーム" → bracket content is a reading annotation
// No single rule handles both, so the matcher tries all three keys.

// ============================================================================
// CHARACTER CLASSES
// ============================================================================

const OPEN_BRACKETS: [char; 2] = ['（', '('];
const CLOSE_BRACKETS: [char; 2] = ['）', ')'];

/// Wave dash (U+301C), full-width tilde (U+FF5E), ASCII tilde
const WAVE_DASHES: [char; 3] = ['〜', '～', '~'];

fn is_open_bracket(c: char) -> bool {
    OPEN_BRACKETS.contains(&c)
}

fn is_close_bracket(c: char) -> bool {
    CLOSE_BRACKETS.contains(&c)
}

fn is_wave_dash(c: char) -> bool {
    WAVE_DASHES.contains(&c)
}

/// Drop every whitespace character (ASCII and the ideographic space U+3000)
fn without_whitespace(s: &str) -> impl Iterator<Item = char> + '_ {
    s.chars().filter(|c| !c.is_whitespace())
}

// ============================================================================
// COMPARISON KEYS
// ============================================================================

/// Remove whitespace, unify bracket and wave-dash variants, lower-case.
///
/// Example: "sirena （シレーナ）" → "sirena(シレーナ)"
pub fn normalize(s: &str) -> String {
    let unified: String = without_whitespace(s)
        .map(|c| {
            if is_open_bracket(c) {
                '('
            } else if is_close_bracket(c) {
                ')'
            } else if is_wave_dash(c) {
                '~'
            } else {
                c
            }
        })
        .collect();

    unified.to_lowercase()
}

/// Like [`normalize`], but delete the bracket and wave-dash characters
/// themselves while keeping what they enclosed.
///
/// Example: "神のエステ（赤羽）" → "神のエステ赤羽"
pub fn remove_bracket_chars(s: &str) -> String {
    let kept: String = without_whitespace(s)
        .filter(|&c| !is_open_bracket(c) && !is_close_bracket(c) && !is_wave_dash(c))
        .collect();

    kept.to_lowercase()
}

/// Like [`normalize`], but delete each bracket pair together with its content,
/// then each wave-dash-delimited span together with its content.
///
/// An opener with no matching closer after it is left untouched.
///
/// Example: "TORIHADA SPA（トリハダスパ）金山ルーム" → "torihadaspa金山ルーム"
pub fn strip_bracket_content(s: &str) -> String {
    let compact: Vec<char> = without_whitespace(s).collect();
    let no_brackets = strip_delimited(&compact, is_open_bracket, is_close_bracket);
    let no_waves = strip_delimited(&no_brackets, is_wave_dash, is_wave_dash);

    no_waves.into_iter().collect::<String>().to_lowercase()
}

/// Remove every `open … close` span, where the span ends at the first closer
/// after the opener. Scanning resumes right after a removed span.
fn strip_delimited(chars: &[char], open: fn(char) -> bool, close: fn(char) -> bool) -> Vec<char> {
    let mut out = Vec::with_capacity(chars.len());
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        if open(c) {
            let closer = chars[i + 1..].iter().position(|&n| close(n));
            if let Some(offset) = closer {
                i += offset + 2;
                continue;
            }
        }
        out.push(c);
        i += 1;
    }

    out
}

// ============================================================================
// TESTS
// ============================================================================
