use std::collections::BTreeMap;
use std::sync::OnceLock;

use regex::Regex;

fn keyword_argument_re() -> &'static Regex {
    static KEYWORD_ARGUMENT_RE: OnceLock<Regex> = OnceLock::new();
    KEYWORD_ARGUMENT_RE.get_or_init(|| {
        Regex::new(r"^\[(?P<key>.+)\](?P<value>.*)$").expect("valid keyword argument regex")
    })
}

/// A protocol line split into its ordered part and its trailing keyword
/// arguments.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NormalizedLine {
    pub prefix: String,
    pub kwargs: BTreeMap<String, String>,
}

/// Split `raw` on `|` and peel `[key]value` segments off the tail.
///
/// Scanning stops at the first segment that is not a keyword argument, so
/// only a contiguous tail counts. Values are trimmed. When a key repeats, the
/// segment closest to the end of the line wins.
pub fn normalize(raw: &str) -> NormalizedLine {
    let mut segments: Vec<&str> = raw.split('|').collect();
    let mut kwargs = BTreeMap::new();

    while let Some(&segment) = segments.last() {
        let Some(captures) = keyword_argument_re().captures(segment) else {
            break;
        };
        kwargs
            .entry(captures["key"].to_owned())
            .or_insert_with(|| captures["value"].trim().to_owned());
        segments.pop();
    }

    NormalizedLine {
        prefix: segments.join("|"),
        kwargs,
    }
}

/// Whether two lines are the same message once keyword-argument order is
/// disregarded.
pub fn equivalent(raw: &str, serialized: &str) -> bool {
    normalize(raw) == normalize(serialized)
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;

    fn kwargs(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs
            .iter()
            .map(|(key, value)| ((*key).to_owned(), (*value).to_owned()))
            .collect()
    }

    #[test]
    fn line_without_keywords_is_its_own_prefix() {
        let line = normalize("|move|p1a: Garchomp|Earthquake|p2a: Heatran");
        assert_eq!(line.prefix, "|move|p1a: Garchomp|Earthquake|p2a: Heatran");
        assert!(line.kwargs.is_empty());
    }

    #[test]
    fn trailing_keywords_are_extracted_and_trimmed() {
        let line = normalize("|-damage|p2a: Heatran|50/100|[from] item: Life Orb |[silent]");
        assert_eq!(line.prefix, "|-damage|p2a: Heatran|50/100");
        assert_eq!(
            line.kwargs,
            kwargs(&[("from", "item: Life Orb"), ("silent", "")])
        );
    }

    #[test]
    fn keywords_must_be_contiguous_at_the_tail() {
        let line = normalize("|c|[id]7|hello|[color]red");
        assert_eq!(line.prefix, "|c|[id]7|hello");
        assert_eq!(line.kwargs, kwargs(&[("color", "red")]));
    }

    #[test]
    fn later_segment_wins_on_duplicate_key() {
        let line = normalize("|x|[k]first|[k]second");
        assert_eq!(line.prefix, "|x");
        assert_eq!(line.kwargs, kwargs(&[("k", "second")]));
    }

    #[test]
    fn key_runs_to_the_last_closing_bracket() {
        let line = normalize("|x|[a]b]c");
        assert_eq!(line.kwargs, kwargs(&[("a]b", "c")]));
    }

    #[test]
    fn empty_key_is_not_a_keyword() {
        let line = normalize("|x|[]value");
        assert_eq!(line.prefix, "|x|[]value");
        assert!(line.kwargs.is_empty());
    }

    #[test]
    fn all_keyword_line_has_empty_prefix() {
        let line = normalize("[a]1|[b]2");
        assert_eq!(line.prefix, "");
        assert_eq!(line.kwargs, kwargs(&[("a", "1"), ("b", "2")]));
    }

    #[test]
    fn keyword_order_does_not_affect_equivalence() {
        assert!(equivalent("|chat|[id]42|[color]red", "|chat|[color]red|[id]42"));
        assert!(!equivalent("|foo|bar", "|foo|baz"));
        assert!(!equivalent("|chat|[id]42", "|chat|[id]43"));
        assert!(!equivalent("|chat|[id]42", "|chat|[id]42|[color]red"));
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(128))]

        #[test]
        fn lines_without_brackets_normalize_to_themselves(
            segments in prop::collection::vec("[a-z0-9 :/-]{0,12}", 0..8),
        ) {
            let raw = segments.join("|");
            let line = normalize(&raw);
            prop_assert_eq!(line.prefix, raw);
            prop_assert!(line.kwargs.is_empty());
        }

        #[test]
        fn permuted_keywords_yield_the_same_map(
            prefix in prop::collection::vec("[a-z0-9]{1,8}", 1..4),
            pairs in prop::collection::btree_map("[a-z]{1,6}", "[a-z0-9 ]{0,8}", 0..6),
            rotation in 0_usize..6,
        ) {
            let head = format!("|{}", prefix.join("|"));
            let mut tokens: Vec<String> = pairs
                .iter()
                .map(|(key, value)| format!("[{key}]{value}"))
                .collect();
            let forward = normalize(&[head.clone()].into_iter().chain(tokens.clone()).collect::<Vec<_>>().join("|"));
            if !tokens.is_empty() {
                let by = rotation % tokens.len();
                tokens.rotate_left(by);
            }
            tokens.reverse();
            let shuffled = normalize(&[head.clone()].into_iter().chain(tokens).collect::<Vec<_>>().join("|"));

            prop_assert_eq!(&forward.prefix, &head);
            prop_assert_eq!(&forward, &shuffled);
            let trimmed: BTreeMap<String, String> = pairs
                .into_iter()
                .map(|(key, value)| (key, value.trim().to_owned()))
                .collect();
            prop_assert_eq!(forward.kwargs, trimmed);
        }
    }
}
