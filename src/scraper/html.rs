// Minimal tag scanning for the trends table.
// Offsets are byte offsets into the original string; lower-casing is ASCII-only
// so offsets in the lowered copy line up with the original.

pub fn to_lower(s: &str) -> String {
    s.chars()
        .map(|c| if c.is_ascii() { c.to_ascii_lowercase() } else { c })
        .collect()
}

/// Find `<tag` at or after `from` where the name is not a prefix of a longer
/// tag (`<th` must not match `<thead`).
fn find_open_tag(lc: &str, tag: &str, from: usize) -> Option<usize> {
    let needle = format!("<{}", tag);
    let mut pos = from;

    while let Some(rel) = lc.get(pos..)?.find(&needle) {
        let start = pos + rel;
        let after = start + needle.len();
        match lc[after..].chars().next() {
            Some(c) if c == '>' || c == '/' || c.is_ascii_whitespace() => return Some(start),
            None => return None,
            _ => pos = after,
        }
    }

    None
}

/// Next `<tag ...> ... </tag>` block at or after `from`, as (start, end).
/// Nested blocks of the same tag are not supported.
fn next_block_lc(s: &str, lc: &str, tag: &str, from: usize) -> Option<(usize, usize)> {
    let start = find_open_tag(lc, tag, from)?;
    let open_end = s[start..].find('>')? + start + 1;
    let close = format!("</{}>", tag);
    let end = lc[open_end..].find(&close)? + open_end + close.len();
    Some((start, end))
}

/// All `<tag>` blocks, in document order
pub fn blocks<'a>(s: &'a str, tag: &str) -> Vec<&'a str> {
    let lc = to_lower(s);
    let mut out = Vec::new();
    let mut pos = 0;

    while let Some((start, end)) = next_block_lc(s, &lc, tag, pos) {
        out.push(&s[start..end]);
        pos = end;
    }

    out
}

/// All cells of a row whose tag is one of `tags`, in document order
pub fn cells<'a>(row: &'a str, tags: &[&str]) -> Vec<&'a str> {
    let lc = to_lower(row);
    let mut out = Vec::new();
    let mut pos = 0;

    loop {
        let next = tags
            .iter()
            .filter_map(|tag| next_block_lc(row, &lc, tag, pos))
            .min_by_key(|(start, _)| *start);

        match next {
            Some((start, end)) => {
                out.push(&row[start..end]);
                pos = end;
            }
            None => break,
        }
    }

    out
}

/// Content between the opening tag and the closing tag of a block
pub fn inner(block: &str) -> &str {
    match (block.find('>'), block.rfind('<')) {
        (Some(open_end), Some(close_start)) if close_start > open_end => &block[open_end + 1..close_start],
        _ => "",
    }
}

/// Opening tag text of a block, e.g. `<span class="btn">`
pub fn open_tag(block: &str) -> &str {
    match block.find('>') {
        Some(end) => &block[..=end],
        None => block,
    }
}

/// Remove `<tag>` blocks for which `drop` returns true
pub fn remove_blocks(s: &str, tag: &str, drop: impl Fn(&str) -> bool) -> String {
    let lc = to_lower(s);
    let mut out = String::with_capacity(s.len());
    let mut pos = 0;

    while let Some((start, end)) = next_block_lc(s, &lc, tag, pos) {
        out.push_str(&s[pos..start]);
        if !drop(&s[start..end]) {
            out.push_str(&s[start..end]);
        }
        pos = end;
    }
    out.push_str(&s[pos..]);

    out
}

pub fn decode_entities(s: &str) -> String {
    s.replace("&nbsp;", " ")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&amp;", "&")
}

/// Collapse whitespace runs into one space and trim
pub fn normalize_ws(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Visible text of an HTML fragment
pub fn text(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut in_tag = false;

    for ch in s.chars() {
        match ch {
            '<' => in_tag = true,
            '>' => in_tag = false,
            _ if !in_tag => out.push(ch),
            _ => {}
        }
    }

    normalize_ws(&decode_entities(&out))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_th_does_not_match_thead() {
        let row = "<thead><tr><th>店舗名</th><TH class=x>01-10</TH></tr></thead>";
        let found: Vec<String> = cells(row, &["th", "td"]).into_iter().map(text).collect();
        assert_eq!(found, vec!["店舗名", "01-10"]);
    }

    #[test]
    fn test_cells_mixed_tags_in_order() {
        let row = "<tr><th>a</th><td>b</td><th>c</th></tr>";
        let found: Vec<String> = cells(row, &["th", "td"]).into_iter().map(text).collect();
        assert_eq!(found, vec!["a", "b", "c"]);
    }

    #[test]
    fn test_remove_blocks() {
        let cell = r#"Karen <span class="btn">店舗分析</span><span>ok</span>"#;
        let cleaned = remove_blocks(cell, "span", |b| open_tag(b).contains("btn"));
        assert_eq!(text(&cleaned), "Karen ok");
    }

    #[test]
    fn test_text_decodes_entities() {
        assert_eq!(text("<b>A&amp;B</b>&nbsp; spa"), "A&B spa");
    }
}
