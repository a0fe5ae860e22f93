//! Byte/text scanning helpers shared by the gate battery.
//!
//! Everything here is deliberately allocation-light and avoids dot-all
//! greedy regexes: sheet XML routinely runs into the millions of bytes and
//! catastrophic backtracking on `<f\b[^>]*>(.*?)</f>`-style patterns is a
//! real failure mode on hostile or merely large input.

use memchr::memmem;

/// Lossily decode bytes to UTF-8 text for pattern scanning.
///
/// Gates that need to report byte offsets work on the raw bytes directly;
/// this is only used where we scan for ASCII-safe substrings.
pub fn decode_lossy(bytes: &[u8]) -> std::borrow::Cow<'_, str> {
    String::from_utf8_lossy(bytes)
}

/// Find every `<tag ...>...</tag>` span (non-nesting) in `haystack`, without
/// backtracking: each open tag is matched to the *next* matching close tag.
/// Returns byte ranges into `haystack`.
pub fn find_element_spans<'a>(haystack: &'a [u8], tag: &str) -> Vec<(usize, usize)> {
    let open_needle = format!("<{tag}");
    let close_needle = format!("</{tag}>");
    let open_finder = memmem::Finder::new(open_needle.as_bytes());
    let close_finder = memmem::Finder::new(close_needle.as_bytes());

    let mut spans = Vec::new();
    let mut search_from = 0usize;
    while let Some(open_rel) = open_finder.find(&haystack[search_from..]) {
        let open_start = search_from + open_rel;
        // Reject matches where the tag name is actually a prefix of a longer
        // name (e.g. `<c` must not match `<conditionalFormatting`).
        let after = open_start + open_needle.len();
        let boundary_ok = haystack
            .get(after)
            .map(|b| *b == b' ' || *b == b'>' || *b == b'/' || *b == b'\t' || *b == b'\n' || *b == b'\r')
            .unwrap_or(false);
        if !boundary_ok {
            search_from = open_start + 1;
            continue;
        }
        match close_finder.find(&haystack[after..]) {
            Some(close_rel) => {
                let close_end = after + close_rel + close_needle.len();
                spans.push((open_start, close_end));
                search_from = close_end;
            }
            // No matching close tag for this open tag; skip past it and
            // keep looking rather than abandoning the whole scan.
            None => search_from = after,
        }
    }
    spans
}

/// Find every `<tag ...>` opening-tag span (not requiring a matching close
/// tag — useful for elements that are always self-closing, like `<c r="..."
/// i=".../>` in calcChain.xml or `<sheet .../>` in the workbook part).
pub fn find_open_tags(haystack: &[u8], tag: &str) -> Vec<(usize, usize)> {
    let open_needle = format!("<{tag}");
    let mut spans = Vec::new();
    let mut search_from = 0usize;
    while let Some(rel) = find(&haystack[search_from..], open_needle.as_bytes()) {
        let start = search_from + rel;
        let after = start + open_needle.len();
        let boundary_ok = haystack
            .get(after)
            .map(|b| *b == b' ' || *b == b'>' || *b == b'/' || *b == b'\t' || *b == b'\n' || *b == b'\r')
            .unwrap_or(false);
        if !boundary_ok {
            search_from = start + 1;
            continue;
        }
        match memchr::memchr(b'>', &haystack[start..]) {
            Some(close_rel) => {
                let end = start + close_rel + 1;
                spans.push((start, end));
                search_from = end;
            }
            None => break,
        }
    }
    spans
}

/// Find the byte offset of the first occurrence of a literal substring.
pub fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    memmem::find(haystack, needle)
}

/// Find all non-overlapping occurrences of a literal substring.
pub fn find_all<'h>(haystack: &'h [u8], needle: &[u8]) -> Vec<usize> {
    memmem::find_iter(haystack, needle).collect()
}

/// Extract the value of an attribute (`name="..."` or `name='...'`) within a
/// single tag's byte span. Returns the raw (un-decoded) attribute value
/// bytes so callers needing byte-exact inspection (e.g. the tableColumn
/// linefeed gate) can look at literal control bytes.
pub fn attr_value_bytes<'a>(tag_bytes: &'a [u8], attr_name: &str) -> Option<&'a [u8]> {
    for quote in [b'"', b'\''] {
        let needle = format!("{attr_name}={}", quote as char);
        if let Some(rel) = memmem::find(tag_bytes, needle.as_bytes()) {
            let start = rel + needle.len();
            if let Some(end_rel) = memchr::memchr(quote, &tag_bytes[start..]) {
                return Some(&tag_bytes[start..start + end_rel]);
            }
        }
    }
    None
}

/// Extract the value of an attribute as a lossily-decoded string.
pub fn attr_value<'a>(tag_bytes: &'a [u8], attr_name: &str) -> Option<std::borrow::Cow<'a, str>> {
    attr_value_bytes(tag_bytes, attr_name).map(decode_lossy)
}

/// Split `xml` on `</c>` boundaries, the same trick the original
/// implementation uses to build a per-sheet "has a formula" index in O(n)
/// without a DOTALL regex. Each yielded chunk ends right after a `</c>`
/// (except possibly the final chunk).
pub fn split_on_cell_close(xml: &[u8]) -> Vec<&[u8]> {
    let needle = b"</c>";
    let mut chunks = Vec::new();
    let mut start = 0usize;
    for rel in memmem::find_iter(xml, needle) {
        let end = rel + needle.len();
        chunks.push(&xml[start..end]);
        start = end;
    }
    if start < xml.len() {
        chunks.push(&xml[start..]);
    }
    chunks
}

/// Find the byte range of the last `<c ...>` opening tag within `chunk`
/// (there should be at most one real one per `</c>`-delimited chunk, but we
/// defensively take the last candidate), returning `(cell_ref, tag_end)`.
pub fn last_cell_open_tag(chunk: &[u8]) -> Option<(String, usize)> {
    let mut best: Option<(String, usize)> = None;
    let mut search_from = 0usize;
    while let Some(rel) = memmem::find(&chunk[search_from..], b"<c") {
        let start = search_from + rel;
        let after = start + 2;
        let boundary_ok = chunk
            .get(after)
            .map(|b| *b == b' ' || *b == b'>' || *b == b'/')
            .unwrap_or(false);
        if boundary_ok {
            if let Some(tag_end_rel) = memchr::memchr(b'>', &chunk[start..]) {
                let tag_end = start + tag_end_rel + 1;
                if let Some(r) = attr_value(&chunk[start..tag_end], "r") {
                    best = Some((r.into_owned(), tag_end));
                }
            }
        }
        search_from = start + 1;
    }
    best
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn finds_element_spans() {
        let xml = b"<row><conditionalFormatting>X</conditionalFormatting></row>";
        let spans = find_element_spans(xml, "conditionalFormatting");
        assert_eq!(spans.len(), 1);
        let (s, e) = spans[0];
        assert_eq!(&xml[s..e], &xml[5..55]);
    }

    #[test]
    fn attr_value_handles_single_and_double_quotes() {
        assert_eq!(attr_value(br#"<c r="A1">"#, "r").as_deref(), Some("A1"));
        assert_eq!(attr_value(b"<c r='A1'>", "r").as_deref(), Some("A1"));
        assert_eq!(attr_value(b"<c s=\"3\">", "r"), None);
    }

    #[test]
    fn split_on_cell_close_preserves_trailing_chunk() {
        let chunks = split_on_cell_close(b"<c r=\"A1\"/></c><c r=\"A2\">tail");
        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[1], b"<c r=\"A2\">tail");
    }
}
