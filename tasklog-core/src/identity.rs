//! Current-user resolution and assignee ranking.
//!
//! An unconfigured backend yields an empty [`Identity`]; every method here
//! degrades to "unknown" instead of failing.

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::backend::VcsBackend;
use crate::models::{ContributorSet, Identity};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssigneeSuggestion {
    pub identity: Identity,
    pub is_you: bool,
}

impl AssigneeSuggestion {
    pub fn label(&self) -> String {
        if self.is_you {
            format!("{} (you)", self.identity.display())
        } else {
            self.identity.display()
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IdentityResolver {
    current: Identity,
}

impl IdentityResolver {
    pub fn resolve(backend: &dyn VcsBackend) -> Self {
        let current = backend.current_user();
        if current.is_empty() {
            warn!("No {} identity configured; author fields stay empty", backend.kind());
        }
        Self { current }
    }

    pub fn from_identity(identity: Identity) -> Self {
        Self {
            current: Identity::new(identity.name, identity.email),
        }
    }

    pub fn current_user(&self) -> &Identity {
        &self.current
    }

    pub fn is_known(&self) -> bool {
        !self.current.is_empty()
    }

    /// Value for a new record's author field; `None` means skip auto-fill.
    pub fn default_author(&self) -> Option<String> {
        self.is_known().then(|| self.current.display())
    }

    pub fn is_current_user(&self, email: &str) -> bool {
        let email = email.trim();
        !self.current.email.is_empty() && self.current.email.eq_ignore_ascii_case(email)
    }

    /// Contributors ordered for an assignee picker: the current user first,
    /// then everyone else by name.
    pub fn assignee_suggestions(&self, contributors: &ContributorSet) -> Vec<AssigneeSuggestion> {
        let mut others: Vec<&Identity> = contributors
            .iter()
            .filter(|identity| !self.is_current_user(&identity.email))
            .collect();
        others.sort_by_key(|identity| (identity.name.to_lowercase(), identity.email.to_lowercase()));

        let mut suggestions = Vec::with_capacity(others.len() + 1);
        if !self.current.email.is_empty() {
            let known = contributors
                .iter()
                .find(|identity| self.is_current_user(&identity.email))
                .cloned();
            let mut identity = known.unwrap_or_else(|| self.current.clone());
            if !self.current.name.is_empty() {
                identity.name = self.current.name.clone();
            }
            suggestions.push(AssigneeSuggestion {
                identity,
                is_you: true,
            });
        }
        suggestions.extend(others.into_iter().map(|identity| AssigneeSuggestion {
            identity: identity.clone(),
            is_you: false,
        }));
        suggestions
    }
}
