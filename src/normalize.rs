//! Search-text normalization.
//!
//! Flattens a resolved document body into plain text for substring
//! scoring. The steps run in a fixed order: fenced blocks go first so their
//! contents never leak into the later tag and inline-code passes.

use regex::Regex;
use std::sync::LazyLock;

static FENCE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)```.*?```").expect("valid fence regex"));
static TAG_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"<[^>]+>").expect("valid tag regex"));
static INLINE_CODE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"`[^`]*`").expect("valid inline code regex"));
static PUNCT_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[#>*_\-\[\]()!]").expect("valid punctuation regex"));
static SPACE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\s+").expect("valid whitespace regex"));

/// Convert markup into flattened search text. Idempotent.
pub fn normalize(body: &str) -> String {
    let text = FENCE_RE.replace_all(body, " ");
    let text = TAG_RE.replace_all(&text, " ");
    let text = INLINE_CODE_RE.replace_all(&text, " ");
    let text = PUNCT_RE.replace_all(&text, " ");
    let text = SPACE_RE.replace_all(&text, " ");
    text.trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_strips_markup() {
        let body = "# Install\n\nRun `npm i` then:\n\n```bash\nnpm run build\n```\n\n<Callout type=\"info\">**Note**: _done_!</Callout>\n\n- [link](http://x)";
        assert_eq!(normalize(body), "Install Run then: Note : done link http://x");
    }

    #[test]
    fn test_multiline_tag() {
        assert_eq!(normalize("a <Tabs\n  items={[1]}\n/> b"), "a b");
    }

    #[test]
    fn test_empty_and_whitespace() {
        assert_eq!(normalize(""), "");
        assert_eq!(normalize("  \n\t "), "");
    }

    #[test]
    fn test_idempotent() {
        let samples = [
            "# Title\n\nBody with `code` and <b>tags</b>.",
            "```\nunterminated fence",
            "``` a ``` ``` b",
            "a ` lone backtick",
            "<`x`> and `<y>`",
            "nested <a <b>> tags",
            "![image](src.png) > quote *em* __strong__ -- dash",
            "  lots   of\n\n\nspace\t\t",
            "<include>shared/x.mdx</include> trailing <",
            "unicode: café — naïve ` ``` `",
        ];
        for sample in samples {
            let once = normalize(sample);
            assert_eq!(normalize(&once), once, "not idempotent for {:?}", sample);
        }
    }

    proptest! {
        #[test]
        fn normalize_is_idempotent_for_markup(body in "[a-z0-9`<>#*_()!\\[\\] \t\n/=\"{}.-]{0,96}") {
            let once = normalize(&body);
            prop_assert_eq!(normalize(&once), once);
        }

        #[test]
        fn normalize_is_idempotent_for_any_text(body in "\\PC{0,128}") {
            let once = normalize(&body);
            prop_assert_eq!(normalize(&once), once);
        }
    }
}
