use regex::RegexBuilder;

/// Ordered set of activation phrase variants. The set is data, not an
/// algorithm: near-miss phonetic spellings ("hey sonik", "a sonic") are
/// listed explicitly so matching stays deterministic and enumerable.
#[derive(Debug, Clone)]
pub struct WakeWordSet {
    phrases: Vec<String>,
    strip_re: Option<regex::Regex>,
}

impl WakeWordSet {
    pub fn new(phrases: &[String]) -> Self {
        let phrases: Vec<String> = phrases
            .iter()
            .map(|p| p.trim().to_lowercase())
            .filter(|p| !p.is_empty())
            .collect();

        // One alternation over all variants, longest first so "hey sonic"
        // wins over a bare "sonic" when both are configured.
        let strip_re = if phrases.is_empty() {
            None
        } else {
            let mut sorted = phrases.clone();
            sorted.sort_by_key(|p| std::cmp::Reverse(p.len()));
            let alternation = sorted
                .iter()
                .map(|p| regex::escape(p))
                .collect::<Vec<_>>()
                .join("|");
            RegexBuilder::new(&format!(r"\b({})\b", alternation))
                .case_insensitive(true)
                .build()
                .ok()
        };

        Self { phrases, strip_re }
    }

    /// Case-insensitive substring test against the variant set.
    pub fn matches(&self, fragment_text: &str) -> bool {
        let lowered = fragment_text.to_lowercase();
        self.phrases.iter().any(|p| lowered.contains(p.as_str()))
    }

    /// Remove every wake-word variant (whole tokens, case-insensitive) and
    /// collapse the leftover whitespace, yielding the command-only text.
    pub fn strip(&self, text: &str) -> String {
        let stripped = match &self.strip_re {
            Some(re) => re.replace_all(text, " ").into_owned(),
            None => text.to_string(),
        };
        stripped.split_whitespace().collect::<Vec<_>>().join(" ")
    }

    pub fn is_empty(&self) -> bool {
        self.phrases.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn default_set() -> WakeWordSet {
        WakeWordSet::new(&[
            "hey sonic".to_string(),
            "hey sonik".to_string(),
            "hay sonic".to_string(),
            "a sonic".to_string(),
            "sonic".to_string(),
        ])
    }

    #[test]
    fn test_matches_every_configured_variant() {
        let set = default_set();
        for variant in ["hey sonic", "hey sonik", "hay sonic", "a sonic", "sonic"] {
            assert!(set.matches(variant), "variant '{}' should match", variant);
        }
    }

    #[test]
    fn test_matches_is_case_insensitive() {
        let set = default_set();
        assert!(set.matches("Hey Sonic"));
        assert!(set.matches("HEY SONIC bridge tokens"));
    }

    #[test]
    fn test_matches_inside_longer_fragment() {
        let set = default_set();
        assert!(set.matches("um hey sonic bridge 100 usdc"));
    }

    #[test]
    fn test_no_match_for_unrelated_text() {
        let set = default_set();
        assert!(!set.matches("bridge 100 usdc to sui"));
        assert!(!set.matches("hey siri"));
    }

    #[test]
    fn test_strip_removes_wake_phrase() {
        let set = default_set();
        assert_eq!(set.strip("hey sonic bridge 100 usdc"), "bridge 100 usdc");
    }

    #[test]
    fn test_strip_prefers_longest_variant() {
        // "hey sonic" must go as a unit, not leave a dangling "hey".
        let set = default_set();
        assert_eq!(set.strip("Hey Sonic send 1 eth"), "send 1 eth");
    }

    #[test]
    fn test_strip_removes_repeated_variants() {
        let set = default_set();
        assert_eq!(set.strip("sonic sonic bridge"), "bridge");
    }

    #[test]
    fn test_strip_keeps_partial_words_intact() {
        // "sonics" is not the token "sonic".
        let set = default_set();
        assert_eq!(set.strip("supersonics are fast"), "supersonics are fast");
    }

    #[test]
    fn test_strip_collapses_whitespace() {
        let set = default_set();
        assert_eq!(set.strip("  hey sonic   bridge   now "), "bridge now");
    }

    #[test]
    fn test_empty_set_never_matches() {
        let set = WakeWordSet::new(&[]);
        assert!(set.is_empty());
        assert!(!set.matches("hey sonic"));
        assert_eq!(set.strip("hey sonic bridge"), "hey sonic bridge");
    }
}
