use crate::models::RelevanceClass;

/// Short function words that carry no meaning for matching a query against
/// a listing title.
const QUERY_STOP_WORDS: &[&str] = &[
    "для", "от", "в", "на", "с", "по", "из", "у", "о", "об", "бу", "б/у",
];

/// Splits a search query into lowercase tokens, dropping punctuation,
/// stop words and single characters.
pub fn query_tokens(query: &str) -> Vec<String> {
    let cleaned: String = query
        .to_lowercase()
        .chars()
        .map(|c| if c.is_alphanumeric() { c } else { ' ' })
        .collect();

    let tokens: Vec<String> = cleaned
        .split_whitespace()
        .filter(|w| w.chars().count() > 1 && !QUERY_STOP_WORDS.contains(w))
        .map(|w| w.to_string())
        .collect();

    if tokens.is_empty() {
        // Degenerate queries ("в у") keep whatever multi-char words they had
        cleaned
            .split_whitespace()
            .filter(|w| w.chars().count() > 1)
            .map(|w| w.to_string())
            .collect()
    } else {
        tokens
    }
}

/// Classifies a title against the original query string.
///
/// exact   — the query appears as a substring, or every token is present;
/// partial — at least half of the tokens (or any single token) are present;
/// other   — nothing matched.
pub fn classify(title: &str, query: &str) -> RelevanceClass {
    let title_lower = title.to_lowercase();
    let query_lower = query.trim().to_lowercase();

    if !query_lower.is_empty() && title_lower.contains(&query_lower) {
        return RelevanceClass::Exact;
    }

    let tokens = query_tokens(query);
    if tokens.is_empty() {
        return RelevanceClass::Other;
    }

    let matched = tokens.iter().filter(|t| title_lower.contains(*t)).count();

    if matched == tokens.len() {
        return RelevanceClass::Exact;
    }

    if matched as f64 / tokens.len() as f64 >= 0.5 || matched > 0 {
        return RelevanceClass::Partial;
    }

    RelevanceClass::Other
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[test]
    fn test_tokens_drop_stop_words() {
        assert_eq!(query_tokens("чехол для iphone 13"), vec!["чехол", "iphone", "13"]);
        assert_eq!(query_tokens("куртка б/у на зиму"), vec!["куртка", "зиму"]);
    }

    #[test]
    fn test_tokens_degenerate_query() {
        // All words are stop words; longer words survive as a fallback
        assert_eq!(query_tokens("для бу"), vec!["для", "бу"]);
    }

    #[rstest]
    #[case("iPhone 13 Pro 128", "iphone 13", RelevanceClass::Exact)]
    #[case("Продам iPhone 13 Pro Max", "iphone 13", RelevanceClass::Exact)]
    #[case("iPhone 12 Pro", "iphone 13", RelevanceClass::Partial)]
    #[case("iPad Air 2020", "iphone 13", RelevanceClass::Other)]
    #[case("Mazda 6 2018 2.0 AT", "mazda 6", RelevanceClass::Exact)]
    #[case("Зимняя куртка The North Face", "куртка north face", RelevanceClass::Exact)]
    fn test_classification(
        #[case] title: &str,
        #[case] query: &str,
        #[case] expected: RelevanceClass,
    ) {
        assert_eq!(classify(title, query), expected);
    }

    #[test]
    fn test_all_tokens_present_without_substring() {
        // Tokens out of order still count as exact
        assert_eq!(
            classify("Pro 128 iPhone в идеальном состоянии, 13 серия", "iphone 13"),
            RelevanceClass::Exact
        );
    }

    #[test]
    fn test_stop_word_does_not_change_class() {
        // Property: adding a stop-word token never changes the verdict
        let titles = [
            "iPhone 13 Pro 128",
            "iPhone 12 Pro",
            "iPad Air 2020",
            "Зимняя куртка",
        ];
        for title in titles {
            let base = classify(title, "iphone 13");
            let with_stop = classify(title, "iphone 13 для");
            assert_eq!(base, with_stop, "title: {title}");
        }
    }

    #[test]
    fn test_case_insensitive_substring() {
        assert_eq!(classify("IPHONE 13 PRO", "iphone 13"), RelevanceClass::Exact);
    }
}
