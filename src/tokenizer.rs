//! Text → token conversion shared by the BM25 index and the adaptive-alpha
//! overlap check. Deterministic and stateless: lowercase, extract maximal
//! runs of Unicode word characters, drop anything shorter than two
//! characters. No stemming, no stopword removal.

use regex::Regex;
use std::sync::OnceLock;

fn word_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"\w+").expect("static token pattern is valid"))
}

/// Lowercase `text` and split it into word tokens, dropping single characters.
pub fn tokenize(text: &str) -> Vec<String> {
    let lowered = text.to_lowercase();
    word_pattern()
        .find_iter(&lowered)
        .map(|m| m.as_str().to_string())
        .filter(|t| t.chars().count() >= 2)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn basic_ascii() {
        assert_eq!(
            tokenize("The Quick Brown Fox"),
            vec!["the", "quick", "brown", "fox"]
        );
    }

    #[test]
    fn drops_single_character_tokens() {
        assert_eq!(tokenize("a fox is a fox"), vec!["fox", "is", "fox"]);
    }

    #[test]
    fn empty_input_is_total() {
        assert_eq!(tokenize(""), Vec::<String>::new());
        assert_eq!(tokenize("   "), Vec::<String>::new());
    }

    #[test]
    fn unicode_word_characters() {
        // Cyrillic letters count as word characters under Unicode mode.
        assert_eq!(tokenize("Быстрая лиса"), vec!["быстрая", "лиса"]);
    }

    #[test]
    fn punctuation_is_a_separator() {
        assert_eq!(
            tokenize("fox, dog; cat!"),
            vec!["fox", "dog", "cat"]
        );
    }

    #[test]
    fn deterministic_and_stateless() {
        let a = tokenize("brown fox jumps");
        let b = tokenize("brown fox jumps");
        assert_eq!(a, b);
    }
}
