//! Comment text cleaning.
//!
//! A [`TextCleaner`] applies an ordered list of [`CleaningRule`]s. Every rule
//! only deletes text; order matters because later rules see the output of
//! earlier ones.

use lazy_static::lazy_static;
use regex::Regex;
use std::borrow::Cow;

lazy_static! {
    static ref MENTION_REGEX: Regex = Regex::new(r"@[A-Za-z0-9]+").unwrap();
    static ref RETWEET_REGEX: Regex = Regex::new(r"RT\s+").unwrap();
    static ref URL_REGEX: Regex = Regex::new(r"https?://\S+").unwrap();
    static ref EMOJI_REGEX: Regex = Regex::new(concat!(
        "[",
        r"\x{1F600}-\x{1F64F}", // emoticons
        r"\x{1F300}-\x{1F5FF}", // symbols & pictographs
        r"\x{1F680}-\x{1F6FF}", // transport & map
        r"\x{1F1E0}-\x{1F1FF}", // flags
        r"\x{2640}-\x{2642}",
        r"\x{2600}-\x{2B55}",
        r"\x{200D}",
        r"\x{23CF}",
        r"\x{23E9}",
        r"\x{231A}",
        r"\x{FE0F}",
        r"\x{3030}",
        "]+"
    ))
    .unwrap();
}

pub trait CleaningRule: Send + Sync {
    fn name(&self) -> &'static str;

    fn apply<'a>(&self, text: &'a str) -> Cow<'a, str>;
}

/// Deletes every match of a regular expression.
pub struct PatternRule {
    name: &'static str,
    regex: &'static Regex,
}

impl PatternRule {
    pub fn mentions() -> Self {
        Self {
            name: "mentions",
            regex: &MENTION_REGEX,
        }
    }

    /// Case-sensitive and unanchored, so "ART x" loses its "RT ".
    pub fn retweet_markers() -> Self {
        Self {
            name: "retweet_markers",
            regex: &RETWEET_REGEX,
        }
    }

    pub fn urls() -> Self {
        Self {
            name: "urls",
            regex: &URL_REGEX,
        }
    }

    pub fn emoji() -> Self {
        Self {
            name: "emoji",
            regex: &EMOJI_REGEX,
        }
    }
}

impl CleaningRule for PatternRule {
    fn name(&self) -> &'static str {
        self.name
    }

    fn apply<'a>(&self, text: &'a str) -> Cow<'a, str> {
        self.regex.replace_all(text, "")
    }
}

/// Deletes every occurrence of one character.
pub struct StripCharRule {
    name: &'static str,
    target: char,
}

impl StripCharRule {
    pub fn hashes() -> Self {
        Self {
            name: "hashes",
            target: '#',
        }
    }

    pub fn colons() -> Self {
        Self {
            name: "colons",
            target: ':',
        }
    }
}

impl CleaningRule for StripCharRule {
    fn name(&self) -> &'static str {
        self.name
    }

    fn apply<'a>(&self, text: &'a str) -> Cow<'a, str> {
        if text.contains(self.target) {
            Cow::Owned(text.chars().filter(|c| *c != self.target).collect())
        } else {
            Cow::Borrowed(text)
        }
    }
}

pub struct TextCleaner {
    rules: Vec<Box<dyn CleaningRule>>,
}

impl TextCleaner {
    pub fn new(rules: Vec<Box<dyn CleaningRule>>) -> Self {
        Self { rules }
    }

    /// Mentions, hashes, retweet markers, URLs, colons, emoji, in that order.
    pub fn standard() -> Self {
        Self::new(vec![
            Box::new(PatternRule::mentions()),
            Box::new(StripCharRule::hashes()),
            Box::new(PatternRule::retweet_markers()),
            Box::new(PatternRule::urls()),
            Box::new(StripCharRule::colons()),
            Box::new(PatternRule::emoji()),
        ])
    }

    pub fn rule_names(&self) -> Vec<&'static str> {
        self.rules.iter().map(|rule| rule.name()).collect()
    }

    /// Absent text cleans to an empty string. Whitespace is left as is.
    pub fn clean(&self, text: Option<&str>) -> String {
        let Some(text) = text else {
            return String::new();
        };

        let mut current = text.to_string();
        for rule in &self.rules {
            current = rule.apply(&current).into_owned();
        }
        current
    }
}

impl Default for TextCleaner {
    fn default() -> Self {
        Self::standard()
    }
}

impl std::fmt::Debug for TextCleaner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TextCleaner")
            .field("rules", &self.rule_names())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn clean(text: &str) -> String {
        TextCleaner::standard().clean(Some(text))
    }

    #[test]
    fn test_standard_rule_order() {
        assert_eq!(
            TextCleaner::standard().rule_names(),
            vec!["mentions", "hashes", "retweet_markers", "urls", "colons", "emoji"]
        );
    }

    #[test]
    fn test_full_example() {
        assert_eq!(
            clean("Check this out RT @user: 😀 https://example.com #cool"),
            "Check this out    cool"
        );
    }

    #[test]
    fn test_individual_rules() {
        assert_eq!(PatternRule::mentions().apply("hi @bob42 there"), "hi  there");
        assert_eq!(PatternRule::mentions().apply("mail@"), "mail@");
        assert_eq!(StripCharRule::hashes().apply("#rust #lang"), "rust lang");
        assert_eq!(PatternRule::retweet_markers().apply("RT   hello"), "hello");
        assert_eq!(PatternRule::retweet_markers().apply("ART x"), "Ax");
        assert_eq!(PatternRule::retweet_markers().apply("rt hello"), "rt hello");
        assert_eq!(
            PatternRule::urls().apply("see http://a.b/c?d=1 and https://x.y"),
            "see  and "
        );
        assert_eq!(StripCharRule::colons().apply("a:b::c"), "abc");
        assert_eq!(PatternRule::emoji().apply("ok 👍🏽🚀🇲🇦 ☀️ done"), "ok   done");
    }

    #[test]
    fn test_mention_stops_at_non_alphanumeric() {
        assert_eq!(clean("@user_name hi"), "_name hi");
    }

    #[test]
    fn test_absent_text_is_empty() {
        assert_eq!(TextCleaner::default().clean(None), "");
        assert_eq!(clean(""), "");
    }

    #[test]
    fn test_plain_text_is_unchanged() {
        let text = "Le réseau est très lent aujourd'hui à Casablanca.";
        assert_eq!(clean(text), text);
    }

    #[test]
    fn test_cleaning_is_deterministic_and_idempotent_on_clean_output() {
        let inputs = [
            "Check this out RT @user: 😀 https://example.com #cool",
            "#inwi 4G down again :( @inwi_care",
            "Merci! 🇲🇦🇲🇦 http://t.co/xyz",
        ];

        let cleaner = TextCleaner::standard();
        for input in inputs {
            let once = cleaner.clean(Some(input));
            assert_eq!(once, cleaner.clean(Some(input)));
            assert_eq!(cleaner.clean(Some(&once)), once);
        }
    }

    #[test]
    fn test_later_rules_can_expose_earlier_patterns() {
        // The colon goes after the retweet rule has already run
        let cleaner = TextCleaner::standard();
        let once = cleaner.clean(Some("R:T x"));
        assert_eq!(once, "RT x");
        assert_eq!(cleaner.clean(Some(&once)), "x");
    }

    #[test]
    fn test_custom_rule_list() {
        let cleaner = TextCleaner::new(vec![Box::new(StripCharRule::colons())]);
        assert_eq!(cleaner.clean(Some("#a: @b")), "#a @b");
    }
}
