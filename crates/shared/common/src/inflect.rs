//! English inflection rules used to derive event and resource names.

/// Word inflection used by repositories.
pub trait Inflector: Send + Sync {
    /// Past tense of an operation name (`update` -> `updated`).
    fn past(&self, word: &str) -> String;

    /// Singular form of a table name (`posts` -> `post`).
    fn singularize(&self, word: &str) -> String;

    /// Plural form of a record name (`category` -> `categories`).
    fn pluralize(&self, word: &str) -> String;
}

/// Regular English rules, no irregular verbs or nouns.
#[derive(Debug, Clone, Copy, Default)]
pub struct EnglishInflector;

fn is_vowel(c: char) -> bool {
    matches!(c, 'a' | 'e' | 'i' | 'o' | 'u')
}

/// Character before the last one, if any.
fn penultimate(word: &str) -> Option<char> {
    word.chars().rev().nth(1)
}

impl EnglishInflector {
    fn past_of_verb(verb: &str) -> String {
        if verb.is_empty() || verb.ends_with("ed") {
            return verb.to_string();
        }
        if verb.ends_with('e') {
            return format!("{}d", verb);
        }
        if verb.ends_with('y') && !penultimate(verb).is_some_and(is_vowel) {
            return format!("{}ied", &verb[..verb.len() - 1]);
        }
        format!("{}ed", verb)
    }
}

impl Inflector for EnglishInflector {
    /// Snake case names inflect their leading verb: `publish_post` becomes
    /// `published_post`.
    fn past(&self, word: &str) -> String {
        match word.split_once('_') {
            Some((verb, rest)) => format!("{}_{}", Self::past_of_verb(verb), rest),
            None => Self::past_of_verb(word),
        }
    }

    fn singularize(&self, word: &str) -> String {
        if let Some(stem) = word.strip_suffix("ies") {
            return format!("{}y", stem);
        }
        for suffix in ["sses", "xes", "zes", "ches", "shes"] {
            if word.ends_with(suffix) {
                return word[..word.len() - 2].to_string();
            }
        }
        if word.ends_with('s') && !word.ends_with("ss") {
            return word[..word.len() - 1].to_string();
        }
        word.to_string()
    }

    fn pluralize(&self, word: &str) -> String {
        if word.ends_with('y') && !penultimate(word).is_some_and(is_vowel) {
            return format!("{}ies", &word[..word.len() - 1]);
        }
        for suffix in ["s", "x", "z", "ch", "sh"] {
            if word.ends_with(suffix) {
                return format!("{}es", word);
            }
        }
        format!("{}s", word)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn past_tense_of_operation_names() {
        let inflector = EnglishInflector;
        assert_eq!(inflector.past("update"), "updated");
        assert_eq!(inflector.past("create"), "created");
        assert_eq!(inflector.past("publish"), "published");
        assert_eq!(inflector.past("copy"), "copied");
        assert_eq!(inflector.past("play"), "played");
        assert_eq!(inflector.past("publish_post"), "published_post");
        assert_eq!(inflector.past("archived"), "archived");
    }

    #[test]
    fn singular_and_plural_forms() {
        let inflector = EnglishInflector;
        assert_eq!(inflector.singularize("posts"), "post");
        assert_eq!(inflector.singularize("categories"), "category");
        assert_eq!(inflector.singularize("boxes"), "box");
        assert_eq!(inflector.singularize("address"), "address");
        assert_eq!(inflector.pluralize("post"), "posts");
        assert_eq!(inflector.pluralize("category"), "categories");
        assert_eq!(inflector.pluralize("day"), "days");
        assert_eq!(inflector.pluralize("match"), "matches");
    }
}
