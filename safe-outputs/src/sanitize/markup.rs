//! XML/HTML comment removal and tag neutralization.

use once_cell::sync::Lazy;
use regex::Captures;
use regex::Regex;

/// Formatting tags that render safely and pass through unchanged.
const SAFE_TAGS: &[&str] = &[
    "b",
    "blockquote",
    "br",
    "code",
    "details",
    "em",
    "h1",
    "h2",
    "h3",
    "h4",
    "h5",
    "h6",
    "hr",
    "i",
    "li",
    "ol",
    "p",
    "pre",
    "strong",
    "sub",
    "summary",
    "sup",
    "table",
    "tbody",
    "td",
    "th",
    "thead",
    "tr",
    "ul",
];

static COMMENT_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)<!--.*?--!?>").expect("compiled comment regex"));
static CDATA_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)<!\[CDATA\[(.*?)\]\]>").expect("compiled cdata regex"));
static TAG_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"<(/?[A-Za-z!][^<>]*)>").expect("compiled tag regex"));
static TAG_NAME_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^/?([A-Za-z][A-Za-z0-9]*)").expect("compiled tag name regex"));

/// Removes `<!-- ... -->` comments until none remain, since dropping one
/// comment can splice the halves of another together.
pub(crate) fn remove_comments(text: &str) -> String {
    let mut current = text.to_string();
    loop {
        let next = COMMENT_RE.replace_all(&current, "").into_owned();
        if next == current {
            return current;
        }
        current = next;
    }
}

/// Rewrites every tag outside [`SAFE_TAGS`] as `(tag)`. CDATA markers are
/// parenthesized and their body goes through the same conversion.
pub(crate) fn neutralize_tags(text: &str) -> String {
    let text = CDATA_RE.replace_all(text, |caps: &Captures<'_>| {
        format!("(![CDATA[{}]])", convert_tags(&caps[1]))
    });
    convert_tags(&text)
}

fn convert_tags(text: &str) -> String {
    let mut current = text.to_string();
    loop {
        let next = TAG_RE
            .replace_all(&current, |caps: &Captures<'_>| {
                let inner = &caps[1];
                if is_safe_tag(inner) {
                    caps[0].to_string()
                } else {
                    format!("({inner})")
                }
            })
            .into_owned();
        if next == current {
            return current;
        }
        current = next;
    }
}

fn is_safe_tag(inner: &str) -> bool {
    TAG_NAME_RE.captures(inner).is_some_and(|caps| {
        let name = caps[1].to_ascii_lowercase();
        let rest = &inner[caps[0].len()..];
        // Safe tags carry no attributes; a trailing `/` is fine on void forms.
        SAFE_TAGS.contains(&name.as_str()) && matches!(rest.trim(), "" | "/")
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn comments_are_removed_even_when_nested() {
        assert_eq!(remove_comments("a<!-- hidden -->b"), "ab");
        assert_eq!(remove_comments("a<!<!-- x -->-- y -->b"), "ab");
        assert_eq!(remove_comments("keep <!-- unterminated"), "keep <!-- unterminated");
    }

    #[test]
    fn unsafe_tags_are_parenthesized() {
        assert_eq!(
            neutralize_tags("<script>alert(1)</script>"),
            "(script)alert(1)(/script)"
        );
        assert_eq!(
            neutralize_tags("<img src=x onerror=alert(1)>"),
            "(img src=x onerror=alert(1))"
        );
    }

    #[test]
    fn safe_tags_pass_through() {
        assert_eq!(
            neutralize_tags("<b>bold</b> <details><summary>s</summary></details><br/>"),
            "<b>bold</b> <details><summary>s</summary></details><br/>"
        );
        assert_eq!(neutralize_tags("<b onclick=x>"), "(b onclick=x)");
    }

    #[test]
    fn cdata_markers_and_contents_are_converted() {
        assert_eq!(
            neutralize_tags("<![CDATA[<script>x</script>]]>"),
            "(![CDATA[(script)x(/script)]])"
        );
    }

    #[test]
    fn split_tags_converge() {
        let once = neutralize_tags("<sc<x>ript>");
        assert_eq!(neutralize_tags(&once), once);
    }
}
