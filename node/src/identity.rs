//! Mapping between chat-visible names and account ids.

use parlor_types::execution::AccountId;
use std::collections::{BTreeMap, HashMap};

/// Resolves display names to accounts and back.
pub trait IdentityResolver: Send + Sync {
    /// Human-readable name for `id` (falls back to the id itself).
    fn label(&self, id: &AccountId) -> String;

    /// Account referred to by `alias`, if any. A leading `@` is ignored.
    fn lookup(&self, alias: &str) -> Option<AccountId>;
}

/// Fixed alias table, loaded from configuration.
#[derive(Clone, Debug, Default)]
pub struct StaticIdentities {
    by_alias: BTreeMap<String, AccountId>,
    labels: HashMap<AccountId, String>,
}

impl StaticIdentities {
    /// Aliases are matched case-insensitively. When several aliases point at the same
    /// account, the alphabetically first one is used as its label.
    pub fn new(aliases: BTreeMap<String, AccountId>) -> Self {
        let by_alias: BTreeMap<_, _> = aliases
            .into_iter()
            .map(|(alias, id)| (normalize(&alias), id))
            .collect();
        let mut labels = HashMap::new();
        for (alias, id) in &by_alias {
            labels.entry(id.clone()).or_insert_with(|| alias.clone());
        }
        Self { by_alias, labels }
    }
}

fn normalize(alias: &str) -> String {
    alias.trim().trim_start_matches('@').to_lowercase()
}

impl IdentityResolver for StaticIdentities {
    fn label(&self, id: &AccountId) -> String {
        match self.labels.get(id) {
            Some(label) => label.clone(),
            None => id.to_string(),
        }
    }

    fn lookup(&self, alias: &str) -> Option<AccountId> {
        let name = normalize(alias);
        if let Some(id) = self.by_alias.get(&name) {
            return Some(id.clone());
        }

        // Raw ids of known accounts are accepted too
        let raw = alias.trim().trim_start_matches('@');
        self.labels
            .keys()
            .find(|id| id.as_str() == raw)
            .cloned()
    }
}
