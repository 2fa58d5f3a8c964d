// SPDX-FileCopyrightText: 2025 RAprogramm <andrey.rozanov.vl@gmail.com>
// SPDX-License-Identifier: MIT

//! Discovery of provider field identifiers.
//!
//! Tracker installations name custom fields freely, so the human names used
//! in configuration are resolved against the live catalogue once per run and
//! frozen into a [`FieldMapping`].

use std::{
    collections::{BTreeMap, BTreeSet},
    future::Future
};

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::error::Error;

/// One entry of the provider field catalogue.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldDescriptor {
    /// Opaque identifier such as `customfield_10016`.
    pub id:         String,
    /// Display name.
    pub name:       String,
    /// Schema type, when the provider reports one.
    #[serde(default)]
    pub field_type: Option<String>
}

/// Source of the field catalogue.
pub trait FieldCatalogue {
    /// Fetches the full catalogue.
    fn fetch_fields(&self) -> impl Future<Output = Result<Vec<FieldDescriptor>, Error>> + Send;
}

/// Immutable map from requested human names to provider ids.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FieldMapping {
    ids: BTreeMap<String, String>
}

impl FieldMapping {
    /// Provider id for `name`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::FieldNotFound`] when `name` was never resolved. That
    /// is a configuration problem, unlike a field that is merely empty on a
    /// given issue.
    pub fn id(&self, name: &str) -> Result<&str, Error> {
        self.ids
            .get(&normalize(name))
            .map(String::as_str)
            .ok_or_else(|| Error::FieldNotFound {
                name: name.to_owned()
            })
    }

    /// Number of resolved names.
    pub fn len(&self) -> usize {
        self.ids.len()
    }

    /// Returns `true` when nothing was resolved.
    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }
}

/// Resolves names against a catalogue fetched at most once.
#[derive(Debug, Default)]
pub struct FieldResolver {
    aliases:   BTreeMap<String, Vec<String>>,
    catalogue: Option<Vec<FieldDescriptor>>,
    fetches:   usize
}

impl FieldResolver {
    /// Creates a resolver with an alias table (`name -> alternatives`).
    pub fn new(aliases: BTreeMap<String, Vec<String>>) -> Self {
        let aliases = aliases
            .into_iter()
            .map(|(name, alternatives)| (normalize(&name), alternatives))
            .collect();
        Self {
            aliases,
            catalogue: None,
            fetches: 0
        }
    }

    /// Number of catalogue fetches performed so far.
    pub fn fetch_count(&self) -> usize {
        self.fetches
    }

    /// Resolves every name in `names`.
    ///
    /// Exact case-insensitive matches win, then the alias table is consulted.
    /// Several catalogue entries sharing a name resolve to the first one in
    /// catalogue order.
    ///
    /// # Errors
    ///
    /// Returns [`Error::FieldNotFound`] for the first name without a match,
    /// or the catalogue fetch error.
    pub async fn resolve<C>(&mut self, source: &C, names: &BTreeSet<String>) -> Result<FieldMapping, Error>
    where
        C: FieldCatalogue
    {
        if self.catalogue.is_none() {
            let fields = source.fetch_fields().await?;
            self.fetches += 1;
            info!(fields = fields.len(), "fetched field catalogue");
            self.catalogue = Some(fields);
        }
        let catalogue = self.catalogue.as_deref().unwrap_or_default();

        let mut ids = BTreeMap::new();
        for name in names {
            let id = self.lookup(catalogue, name).ok_or_else(|| Error::FieldNotFound {
                name: name.clone()
            })?;
            debug!(field = %name, %id, "resolved field");
            ids.insert(normalize(name), id.to_owned());
        }
        Ok(FieldMapping {
            ids
        })
    }

    fn lookup<'a>(&self, catalogue: &'a [FieldDescriptor], name: &str) -> Option<&'a str> {
        let key = normalize(name);
        let candidates = std::iter::once(key.as_str()).chain(
            self.aliases
                .get(&key)
                .into_iter()
                .flatten()
                .map(String::as_str)
        );
        for candidate in candidates {
            let wanted = normalize(candidate);
            let matches: Vec<&FieldDescriptor> = catalogue
                .iter()
                .filter(|field| normalize(&field.name) == wanted)
                .collect();
            if let Some(first) = matches.first() {
                if matches.len() > 1 {
                    let ids: Vec<&str> = matches.iter().map(|field| field.id.as_str()).collect();
                    warn!(field = %name, chosen = %first.id, candidates = ?ids, "ambiguous field name");
                }
                return Some(first.id.as_str());
            }
        }
        None
    }
}

fn normalize(name: &str) -> String {
    name.trim().to_lowercase()
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;

    struct StaticCatalogue {
        fields: Vec<FieldDescriptor>,
        calls:  AtomicUsize
    }

    impl StaticCatalogue {
        fn new(entries: &[(&str, &str)]) -> Self {
            Self {
                fields: entries
                    .iter()
                    .map(|(id, name)| FieldDescriptor {
                        id:         (*id).to_owned(),
                        name:       (*name).to_owned(),
                        field_type: None
                    })
                    .collect(),
                calls:  AtomicUsize::new(0)
            }
        }
    }

    impl FieldCatalogue for StaticCatalogue {
        async fn fetch_fields(&self) -> Result<Vec<FieldDescriptor>, Error> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.fields.clone())
        }
    }

    fn names(values: &[&str]) -> BTreeSet<String> {
        values.iter().map(|value| (*value).to_owned()).collect()
    }

    #[tokio::test]
    async fn resolves_unique_name_case_insensitively() {
        let catalogue = StaticCatalogue::new(&[("customfield_10016", "Story Points"), ("summary", "Summary")]);
        let mut resolver = FieldResolver::default();
        let mapping = resolver
            .resolve(&catalogue, &names(&["story points"]))
            .await
            .expect("resolves");
        assert_eq!(mapping.id("Story Points").expect("present"), "customfield_10016");
    }

    #[tokio::test]
    async fn missing_name_names_exactly_that_field() {
        let catalogue = StaticCatalogue::new(&[("summary", "Summary")]);
        let mut resolver = FieldResolver::default();
        let error = resolver
            .resolve(&catalogue, &names(&["Epic Link"]))
            .await
            .expect_err("absent");
        match error {
            Error::FieldNotFound {
                name
            } => assert_eq!(name, "Epic Link"),
            other => panic!("unexpected error: {other:?}")
        }
    }

    #[tokio::test]
    async fn catalogue_is_fetched_once_per_run() {
        let catalogue = StaticCatalogue::new(&[("customfield_1", "Story Points"), ("customfield_2", "Sprint")]);
        let mut resolver = FieldResolver::default();
        resolver
            .resolve(&catalogue, &names(&["Story Points"]))
            .await
            .expect("first");
        resolver
            .resolve(&catalogue, &names(&["Story Points"]))
            .await
            .expect("second");
        resolver
            .resolve(&catalogue, &names(&["Sprint"]))
            .await
            .expect("third");
        assert_eq!(catalogue.calls.load(Ordering::SeqCst), 1);
        assert_eq!(resolver.fetch_count(), 1);
    }

    #[tokio::test]
    async fn alias_table_is_consulted_after_exact_match() {
        let catalogue = StaticCatalogue::new(&[("customfield_10002", "Story point estimate")]);
        let mut aliases = BTreeMap::new();
        aliases.insert("Story Points".to_owned(), vec!["Story point estimate".to_owned()]);
        let mut resolver = FieldResolver::new(aliases);
        let mapping = resolver
            .resolve(&catalogue, &names(&["Story Points"]))
            .await
            .expect("alias resolves");
        assert_eq!(mapping.id("story points").expect("present"), "customfield_10002");
    }

    #[tokio::test]
    async fn exact_match_beats_alias() {
        let catalogue = StaticCatalogue::new(&[
            ("customfield_alias", "Estimate"),
            ("customfield_exact", "Story Points"),
        ]);
        let mut aliases = BTreeMap::new();
        aliases.insert("Story Points".to_owned(), vec!["Estimate".to_owned()]);
        let mut resolver = FieldResolver::new(aliases);
        let mapping = resolver
            .resolve(&catalogue, &names(&["Story Points"]))
            .await
            .expect("resolves");
        assert_eq!(mapping.id("Story Points").expect("present"), "customfield_exact");
    }

    #[tokio::test]
    async fn ambiguous_names_resolve_to_first_in_catalogue_order() {
        let catalogue = StaticCatalogue::new(&[("customfield_20", "Sprint"), ("customfield_10", "Sprint")]);
        let mut resolver = FieldResolver::default();
        let mapping = resolver
            .resolve(&catalogue, &names(&["Sprint"]))
            .await
            .expect("resolves");
        assert_eq!(mapping.id("Sprint").expect("present"), "customfield_20");
    }

    #[test]
    fn unresolved_lookup_is_a_hard_error() {
        let mapping = FieldMapping::default();
        assert!(mapping.is_empty());
        assert!(matches!(mapping.id("Story Points"), Err(Error::FieldNotFound { .. })));
    }
}
