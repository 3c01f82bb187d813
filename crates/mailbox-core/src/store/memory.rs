//! In-process store.

use std::collections::HashMap;
use std::collections::hash_map::Entry;

use chrono::{DateTime, Utc};
use tokio::sync::Mutex;

use super::{EmailStore, IndexPage, IndexQuery, Order, StoreError, StoreResult};
use crate::condition::{Condition, Update};
use crate::model::Email;

/// Store backed by a map behind a mutex.
///
/// Every request holds the lock for its whole duration, so conditional
/// writes are atomic with respect to each other.
#[derive(Debug, Default)]
pub struct MemoryStore {
    items: Mutex<HashMap<String, Email>>,
}

impl MemoryStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored records.
    pub async fn len(&self) -> usize {
        self.items.lock().await.len()
    }

    /// Returns true if no records are stored.
    pub async fn is_empty(&self) -> bool {
        self.items.lock().await.is_empty()
    }
}

fn check_indexable(email: &Email) -> StoreResult<()> {
    email
        .index_key()
        .map(|_| ())
        .map_err(|e| StoreError::InvalidItem(e.to_string()))
}

impl EmailStore for MemoryStore {
    async fn get(&self, message_id: &str) -> StoreResult<Option<Email>> {
        Ok(self.items.lock().await.get(message_id).cloned())
    }

    async fn insert(&self, email: &Email) -> StoreResult<()> {
        check_indexable(email)?;
        match self.items.lock().await.entry(email.message_id.clone()) {
            Entry::Occupied(_) => Err(StoreError::ConditionFailed),
            Entry::Vacant(slot) => {
                slot.insert(email.clone());
                Ok(())
            }
        }
    }

    async fn update(
        &self,
        message_id: &str,
        update: &Update,
        condition: &Condition,
    ) -> StoreResult<()> {
        let mut items = self.items.lock().await;
        let email = items.get_mut(message_id).ok_or(StoreError::NotFound)?;
        if !condition.evaluate(email) {
            return Err(StoreError::ConditionFailed);
        }
        let mut next = email.clone();
        update.apply(&mut next);
        check_indexable(&next)?;
        *email = next;
        Ok(())
    }

    async fn delete(&self, message_id: &str, condition: &Condition) -> StoreResult<()> {
        let mut items = self.items.lock().await;
        let email = items.get(message_id).ok_or(StoreError::NotFound)?;
        if !condition.evaluate(email) {
            return Err(StoreError::ConditionFailed);
        }
        items.remove(message_id);
        Ok(())
    }

    async fn query(&self, query: &IndexQuery) -> StoreResult<IndexPage> {
        let items = self.items.lock().await;
        let after = query
            .start_after
            .as_ref()
            .map(|p| (p.date_time, p.message_id.as_str()));

        let mut matched: Vec<((DateTime<Utc>, &str), &Email)> = items
            .values()
            .filter(|email| email.is_trashed() == query.trashed)
            .filter_map(|email| {
                let (key, time) = email.index_key().ok()?;
                let key = key.to_string();
                query
                    .key_prefixes
                    .iter()
                    .any(|prefix| key.starts_with(prefix.as_str()))
                    .then_some(((time, email.message_id.as_str()), email))
            })
            .filter(|(position, _)| match (after, query.order) {
                (None, _) => true,
                (Some(after), Order::Asc) => *position > after,
                (Some(after), Order::Desc) => *position < after,
            })
            .collect();

        matched.sort_by(|a, b| a.0.cmp(&b.0));
        if query.order == Order::Desc {
            matched.reverse();
        }

        let has_more = matched.len() > query.limit;
        let items = matched
            .into_iter()
            .take(query.limit)
            .map(|(_, email)| email.clone())
            .collect();
        Ok(IndexPage { items, has_more })
    }
}
