use std::cmp::Ordering;
use std::collections::HashMap;
use std::sync::Arc;
#[cfg(test)]
use std::sync::atomic::{AtomicUsize, Ordering as AtomicOrdering};

use regex::{Regex, RegexBuilder};
use tokio::sync::Mutex;

use super::{Direction, Document, DocumentStore, Filter, FindOptions, Value};
use crate::error::AppResult;

/// Documents held in process memory, grouped by collection.
#[derive(Clone, Default)]
pub struct MemoryStore {
    collections: Arc<Mutex<HashMap<String, Vec<Document>>>>,
    #[cfg(test)]
    finds: Arc<AtomicUsize>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of `find` calls served so far.
    #[cfg(test)]
    pub(crate) fn find_count(&self) -> usize {
        self.finds.load(AtomicOrdering::SeqCst)
    }
}

impl DocumentStore for MemoryStore {
    async fn find(
        &self,
        collection: &str,
        filter: &Filter,
        options: &FindOptions,
    ) -> AppResult<Vec<Document>> {
        #[cfg(test)]
        self.finds.fetch_add(1, AtomicOrdering::SeqCst);

        let matcher = Matcher::compile(filter)?;
        let collections = self.collections.lock().await;
        let Some(documents) = collections.get(collection) else {
            return Ok(Vec::new());
        };

        let mut found: Vec<Document> = documents
            .iter()
            .filter(|doc| matcher.matches(doc))
            .cloned()
            .collect();
        drop(collections);

        if let Some(sort) = &options.sort {
            found.sort_by(|a, b| {
                let ordering = match (a.get(&sort.field), b.get(&sort.field)) {
                    (Some(a), Some(b)) => a.compare(b).unwrap_or(Ordering::Equal),
                    (Some(_), None) => Ordering::Greater,
                    (None, Some(_)) => Ordering::Less,
                    (None, None) => Ordering::Equal,
                };
                match sort.direction {
                    Direction::Ascending => ordering,
                    Direction::Descending => ordering.reverse(),
                }
            });
        }

        if let Some(limit) = options.limit {
            found.truncate(limit);
        }

        Ok(found)
    }

    async fn insert_one(&self, collection: &str, document: Document) -> AppResult<()> {
        self.collections
            .lock()
            .await
            .entry(collection.to_owned())
            .or_default()
            .push(document);
        Ok(())
    }

    async fn delete_many(&self, collection: &str, filter: &Filter) -> AppResult<u64> {
        let matcher = Matcher::compile(filter)?;
        let mut collections = self.collections.lock().await;
        let Some(documents) = collections.get_mut(collection) else {
            return Ok(0);
        };

        let before = documents.len();
        documents.retain(|doc| !matcher.matches(doc));
        Ok((before - documents.len()) as u64)
    }
}

/// A [`Filter`] with its patterns compiled.
enum Matcher<'f> {
    Eq(&'f str, &'f Value),
    Lt(&'f str, &'f Value),
    Pattern(&'f str, Regex),
    And(Vec<Matcher<'f>>),
}

impl<'f> Matcher<'f> {
    fn compile(filter: &'f Filter) -> AppResult<Self> {
        Ok(match filter {
            Filter::Eq(field, value) => Matcher::Eq(field, value),
            Filter::Lt(field, value) => Matcher::Lt(field, value),
            Filter::ContainsIgnoreCase(field, needle) => {
                let regex = RegexBuilder::new(&regex::escape(needle))
                    .case_insensitive(true)
                    .build()?;
                Matcher::Pattern(field, regex)
            }
            Filter::And(filters) => Matcher::And(
                filters
                    .iter()
                    .map(Matcher::compile)
                    .collect::<AppResult<_>>()?,
            ),
        })
    }

    fn matches(&self, doc: &Document) -> bool {
        match self {
            Matcher::Eq(field, value) => doc.get(field) == Some(*value),
            Matcher::Lt(field, value) => doc
                .get(field)
                .and_then(|v| v.compare(value))
                .map_or(false, |o| o == Ordering::Less),
            Matcher::Pattern(field, regex) => match doc.get(field) {
                Some(Value::String(s)) => regex.is_match(s),
                _ => false,
            },
            Matcher::And(matchers) => matchers.iter().all(|m| m.matches(doc)),
        }
    }
}
