//! Name matching and disambiguation over keyring-scoped entity collections.
//!
//! The wallet (or agent) supplies candidate entities per keyring from its
//! own substring search; this module only classifies them into exact and
//! fuzzy buckets and applies the disambiguation policy. Keyring iteration
//! order is an explicit contract: lexicographic by keyring name, so that
//! tie-breaks and ambiguous listings are stable across runs.

use std::collections::BTreeMap;

/// An entity that can be matched against a user-supplied name.
pub trait Named {
    fn entity_name(&self) -> &str;
}

fn names_equal(a: &str, b: &str) -> bool {
    a.to_lowercase() == b.to_lowercase()
}

/// The result of one search: candidates partitioned into entities whose
/// name equals the query case-insensitively and the remainder. An entity
/// lands in exactly one bucket per search.
#[derive(Debug)]
pub struct MatchResult<T> {
    exact: BTreeMap<String, Vec<T>>,
    fuzzy: BTreeMap<String, Vec<T>>,
}

impl<T: Named> MatchResult<T> {
    /// Partition collaborator-supplied candidates, grouped per keyring.
    pub fn classify<I>(query: &str, groups: I) -> Self
    where
        I: IntoIterator<Item = (String, Vec<T>)>,
    {
        let mut exact: BTreeMap<String, Vec<T>> = BTreeMap::new();
        let mut fuzzy: BTreeMap<String, Vec<T>> = BTreeMap::new();
        for (keyring, entities) in groups {
            for entity in entities {
                if names_equal(entity.entity_name(), query) {
                    exact.entry(keyring.clone()).or_default().push(entity);
                } else {
                    fuzzy.entry(keyring.clone()).or_default().push(entity);
                }
            }
        }
        Self { exact, fuzzy }
    }

    pub fn total(&self) -> usize {
        self.exact.values().map(Vec::len).sum::<usize>()
            + self.fuzzy.values().map(Vec::len).sum::<usize>()
    }

    pub fn exact(&self) -> &BTreeMap<String, Vec<T>> {
        &self.exact
    }

    pub fn fuzzy(&self) -> &BTreeMap<String, Vec<T>> {
        &self.fuzzy
    }

    /// Extract the single entity to act on: any exact match wins; fuzzy
    /// matches are consulted only when the exact bucket is empty. Within a
    /// bucket the first keyring's first entity is taken.
    fn take_first(self) -> Option<T> {
        for (_, mut entities) in self.exact {
            if !entities.is_empty() {
                return Some(entities.remove(0));
            }
        }
        for (_, mut entities) in self.fuzzy {
            if !entities.is_empty() {
                return Some(entities.remove(0));
            }
        }
        None
    }

    fn into_grouped(self) -> Vec<Grouped<T>> {
        let mut merged: BTreeMap<String, Vec<T>> = self.exact;
        for (keyring, entities) in self.fuzzy {
            merged.entry(keyring).or_default().extend(entities);
        }
        merged
            .into_iter()
            .flat_map(|(keyring, entities)| {
                entities.into_iter().map(move |entity| Grouped {
                    keyring: keyring.clone(),
                    entity,
                })
            })
            .collect()
    }

    /// Apply the disambiguation policy: zero matches yield no selection,
    /// one match is selected (noting when the canonical name differs from
    /// the query), and anything more is ambiguous, never guessed at.
    pub fn into_selection(self, query: &str) -> Selection<T> {
        match self.total() {
            0 => Selection::None,
            1 => {
                let entity = self.take_first().expect("total is one");
                let expanded_from = if entity.entity_name() != query {
                    Some(query.to_string())
                } else {
                    None
                };
                Selection::One {
                    entity,
                    expanded_from,
                }
            }
            _ => Selection::Many(self.into_grouped()),
        }
    }
}

/// A candidate in an ambiguous listing, tagged with its keyring.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Grouped<T> {
    pub keyring: String,
    pub entity: T,
}

/// Outcome of disambiguating one query.
#[derive(Debug)]
pub enum Selection<T> {
    /// Nothing matched.
    None,
    /// Exactly one entity matched. `expanded_from` carries the original
    /// query when the canonical name differs from what the user typed.
    One {
        entity: T,
        expanded_from: Option<String>,
    },
    /// Multiple entities matched; every candidate listed exactly once,
    /// grouped by keyring. No selection is made.
    Many(Vec<Grouped<T>>),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, PartialEq, Eq)]
    struct Entry(&'static str);

    impl Named for Entry {
        fn entity_name(&self) -> &str {
            self.0
        }
    }

    #[test]
    fn classifies_exact_and_fuzzy() {
        let result = MatchResult::classify(
            "Acme",
            vec![(
                "default".to_string(),
                vec![Entry("Acme"), Entry("Acme Corp")],
            )],
        );
        assert_eq!(result.exact()["default"], vec![Entry("Acme")]);
        assert_eq!(result.fuzzy()["default"], vec![Entry("Acme Corp")]);
        assert_eq!(result.total(), 2);
    }

    #[test]
    fn exact_match_ignores_case() {
        let result = MatchResult::classify(
            "faber college",
            vec![("default".to_string(), vec![Entry("Faber College")])],
        );
        assert_eq!(result.exact().len(), 1);
        assert!(result.fuzzy().is_empty());
    }

    #[test]
    fn single_fuzzy_match_is_selected_with_expansion() {
        let result = MatchResult::classify(
            "faber",
            vec![("default".to_string(), vec![Entry("Faber College")])],
        );
        match result.into_selection("faber") {
            Selection::One {
                entity,
                expanded_from,
            } => {
                assert_eq!(entity, Entry("Faber College"));
                assert_eq!(expanded_from.as_deref(), Some("faber"));
            }
            other => panic!("expected single selection, got {other:?}"),
        }
    }

    #[test]
    fn case_only_difference_still_notes_expansion() {
        let result = MatchResult::classify(
            "acme",
            vec![("default".to_string(), vec![Entry("Acme")])],
        );
        match result.into_selection("acme") {
            Selection::One { expanded_from, .. } => {
                assert_eq!(expanded_from.as_deref(), Some("acme"));
            }
            other => panic!("expected single selection, got {other:?}"),
        }
    }

    #[test]
    fn identical_name_has_no_expansion() {
        let result = MatchResult::classify(
            "Acme",
            vec![("default".to_string(), vec![Entry("Acme")])],
        );
        match result.into_selection("Acme") {
            Selection::One { expanded_from, .. } => assert!(expanded_from.is_none()),
            other => panic!("expected single selection, got {other:?}"),
        }
    }

    #[test]
    fn zero_matches_select_nothing() {
        let result: MatchResult<Entry> = MatchResult::classify("ghost", Vec::new());
        assert!(matches!(result.into_selection("ghost"), Selection::None));
    }

    #[test]
    fn mixed_exact_and_fuzzy_is_ambiguous() {
        let result = MatchResult::classify(
            "Acme",
            vec![(
                "default".to_string(),
                vec![Entry("Acme"), Entry("Acme Corp")],
            )],
        );
        match result.into_selection("Acme") {
            Selection::Many(candidates) => {
                let names: Vec<&str> = candidates
                    .iter()
                    .map(|c| c.entity.entity_name())
                    .collect();
                assert_eq!(names, vec!["Acme", "Acme Corp"]);
            }
            other => panic!("expected ambiguous selection, got {other:?}"),
        }
    }

    #[test]
    fn ambiguous_listing_orders_keyrings_lexicographically() {
        let result = MatchResult::classify(
            "co",
            vec![
                ("zeta".to_string(), vec![Entry("Coast Co")]),
                ("alpha".to_string(), vec![Entry("Copper Co")]),
            ],
        );
        match result.into_selection("co") {
            Selection::Many(candidates) => {
                let keyrings: Vec<&str> =
                    candidates.iter().map(|c| c.keyring.as_str()).collect();
                assert_eq!(keyrings, vec!["alpha", "zeta"]);
            }
            other => panic!("expected ambiguous selection, got {other:?}"),
        }
    }

    #[test]
    fn every_candidate_listed_exactly_once() {
        let result = MatchResult::classify(
            "Acme",
            vec![
                ("one".to_string(), vec![Entry("Acme")]),
                ("two".to_string(), vec![Entry("Acme Corp"), Entry("Acme Labs")]),
            ],
        );
        match result.into_selection("Acme") {
            Selection::Many(candidates) => {
                assert_eq!(candidates.len(), 3);
                let mut names: Vec<&str> = candidates
                    .iter()
                    .map(|c| c.entity.entity_name())
                    .collect();
                names.sort_unstable();
                names.dedup();
                assert_eq!(names.len(), 3);
            }
            other => panic!("expected ambiguous selection, got {other:?}"),
        }
    }

    #[test]
    fn exact_bucket_wins_tie_break() {
        // One exact and no other candidates in a later keyring; the exact
        // entity must be chosen even though a fuzzy one sorts earlier.
        let result = MatchResult::classify(
            "Acme",
            vec![("b".to_string(), vec![Entry("Acme")])],
        );
        match result.into_selection("Acme") {
            Selection::One { entity, .. } => assert_eq!(entity, Entry("Acme")),
            other => panic!("expected single selection, got {other:?}"),
        }
    }
}
