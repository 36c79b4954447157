use std::collections::HashMap;

use crate::error::ChatError;
use crate::store::ChatStore;

/// Unread counts for many conversations at once.
///
/// A message is unread for P when someone other than P sent it after P's
/// read cursor. The whole batch is a single store call however many
/// conversations are asked for.
pub struct UnreadAggregator<'a, S: ChatStore + ?Sized> {
    store: &'a S,
}

impl<'a, S: ChatStore + ?Sized> UnreadAggregator<'a, S> {
    pub fn new(store: &'a S) -> Self {
        Self { store }
    }

    /// Returns a count for every requested id, zero included.
    pub fn compute_unread(
        &self,
        participant_id: &str,
        conversation_ids: &[String],
    ) -> Result<HashMap<String, u64>, ChatError> {
        if conversation_ids.is_empty() {
            return Ok(HashMap::new());
        }

        let mut counts = self.store.unread_counts(participant_id, conversation_ids)?;
        for id in conversation_ids {
            counts.entry(id.clone()).or_insert(0);
        }
        Ok(counts)
    }
}
