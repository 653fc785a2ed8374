//! Duplicate-suppressing merge for retried collections.
//!
//! Two items are duplicates if they share any link, or if their titles are
//! equal ignoring case and surrounding whitespace. Blank links and titles
//! never match anything.

use serde_json::Value;

use crate::artifacts::{Application, Paper};

/// Identity used for duplicate detection.
pub trait Identity {
    /// Every link or external identifier the item carries.
    fn links(&self) -> Vec<&str>;

    fn title(&self) -> Option<&str>;
}

impl Identity for Paper {
    fn links(&self) -> Vec<&str> {
        vec![self.pdf_link.as_str()]
    }

    fn title(&self) -> Option<&str> {
        Some(self.title.as_str())
    }
}

impl Identity for Application {
    fn links(&self) -> Vec<&str> {
        vec![
            self.official_website.as_str(),
            self.documentation_link.as_str(),
        ]
    }

    fn title(&self) -> Option<&str> {
        Some(self.title.as_str())
    }
}

const VALUE_LINK_KEYS: [&str; 5] = ["url", "html_url", "link", "pdf_link", "pdf_url"];
const VALUE_TITLE_KEYS: [&str; 4] = ["title", "full_name", "name", "paper_title"];

/// Raw repository and analysis entries.
impl Identity for Value {
    fn links(&self) -> Vec<&str> {
        VALUE_LINK_KEYS
            .iter()
            .filter_map(|key| self.get(*key).and_then(Value::as_str))
            .collect()
    }

    fn title(&self) -> Option<&str> {
        VALUE_TITLE_KEYS
            .iter()
            .find_map(|key| self.get(*key).and_then(Value::as_str))
    }
}

/// True if `a` and `b` identify the same item.
#[must_use]
pub fn is_duplicate<T: Identity>(a: &T, b: &T) -> bool {
    let shared_link = a.links().into_iter().filter_map(significant).any(|link| {
        b.links()
            .into_iter()
            .filter_map(significant)
            .any(|other| other == link)
    });
    if shared_link {
        return true;
    }
    match (a.title().and_then(significant), b.title().and_then(significant)) {
        (Some(x), Some(y)) => x.to_lowercase() == y.to_lowercase(),
        _ => false,
    }
}

fn significant(s: &str) -> Option<&str> {
    let trimmed = s.trim();
    (!trimmed.is_empty()).then_some(trimmed)
}

/// Append the items of `incoming` that duplicate nothing already kept,
/// including earlier incoming items. Returns how many were appended.
pub fn merge_unique<T: Identity>(existing: &mut Vec<T>, incoming: Vec<T>) -> usize {
    let mut added = 0;
    for item in incoming {
        if existing.iter().any(|kept| is_duplicate(kept, &item)) {
            continue;
        }
        existing.push(item);
        added += 1;
    }
    added
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use serde_json::json;

    fn paper(title: &str, link: &str) -> Paper {
        Paper {
            title: title.to_string(),
            pdf_link: link.to_string(),
            ..Paper::default()
        }
    }

    #[test]
    fn test_duplicate_by_link_or_title() {
        assert!(is_duplicate(&paper("A", "https://x/1"), &paper("B", "https://x/1")));
        assert!(is_duplicate(&paper(" Deep Nets ", ""), &paper("deep nets", "https://x/2")));
        assert!(!is_duplicate(&paper("A", "https://x/1"), &paper("B", "https://x/2")));
        assert!(!is_duplicate(&paper("", ""), &paper("", "")));
    }

    #[test]
    fn test_application_matches_on_either_link() {
        let a = Application {
            title: "One".to_string(),
            documentation_link: "https://docs.example".to_string(),
            ..Application::default()
        };
        let b = Application {
            title: "Two".to_string(),
            official_website: "https://docs.example".to_string(),
            ..Application::default()
        };
        assert!(is_duplicate(&a, &b));
    }

    #[test]
    fn test_merge_values_keeps_first_occurrence() {
        let mut repos = vec![json!({"html_url": "https://github.com/a/b", "stars": 1})];
        let added = merge_unique(
            &mut repos,
            vec![
                json!({"html_url": "https://github.com/a/b", "stars": 2}),
                json!({"full_name": "c/d"}),
                json!({"name": "C/D"}),
            ],
        );
        assert_eq!(added, 1);
        assert_eq!(repos.len(), 2);
        assert_eq!(repos[0]["stars"], 1);
    }

    fn arb_paper() -> impl Strategy<Value = Paper> {
        (
            prop::sample::select(vec!["", "https://a", "https://b", "https://c"]),
            prop::sample::select(vec!["", "alpha", "ALPHA", "beta", "Gamma", "gamma "]),
        )
            .prop_map(|(link, title)| paper(title, link))
    }

    proptest! {
        #[test]
        fn prop_merge_never_keeps_duplicates(
            existing in prop::collection::vec(arb_paper(), 0..6),
            incoming in prop::collection::vec(arb_paper(), 0..10),
        ) {
            let mut kept = Vec::new();
            merge_unique(&mut kept, existing);
            let before = kept.clone();
            merge_unique(&mut kept, incoming.clone());

            prop_assert_eq!(&kept[..before.len()], &before[..]);
            for (i, a) in kept.iter().enumerate() {
                for b in &kept[i + 1..] {
                    prop_assert!(!is_duplicate(a, b));
                }
            }
            for item in &incoming {
                prop_assert!(kept.iter().any(|k| k == item || is_duplicate(k, item)));
            }
        }
    }
}
