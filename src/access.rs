//! Layered access rules over private resources.
//!
//! Three textual sources decide `(subject, path, level)`: the user's own
//! `access.txt`, group membership from `.group`, and the global `.access`
//! file. Rule files are re-read on every evaluation, so edits take effect
//! without a restart.

use crate::store::{Store, StoreError};
use crate::users;
use serde::Serialize;
use std::collections::HashMap;

/// Global rule file under the data root.
pub const GLOBAL_RULES_PATH: &str = ".access";
/// Group membership file under the data root.
pub const GROUPS_PATH: &str = ".group";

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AccessLevel {
    Read,
    Write,
    Delete,
}

impl AccessLevel {
    #[must_use]
    pub fn as_char(self) -> char {
        match self {
            Self::Read => 'r',
            Self::Write => 'w',
            Self::Delete => 'd',
        }
    }
}

/// One `<subject> <access> <target>` line.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct AccessRule {
    pub subject: String,
    pub access: String,
    pub target: String,
}

impl AccessRule {
    /// A rule matches when the level character is granted and the requested
    /// path starts with the rule's target, both normalised to a leading `/`.
    #[must_use]
    pub fn matches(&self, path: &str, level: AccessLevel) -> bool {
        self.access.contains(level.as_char())
            && normalize_path(path).starts_with(&normalize_path(&self.target))
    }
}

/// Summary returned by the `/auth/access/info` endpoint.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AccessInfo {
    pub user_access: Vec<AccessRule>,
    pub group_rules: Vec<AccessRule>,
    pub global_rules: Vec<AccessRule>,
    pub groups: Vec<String>,
}

fn normalize_path(path: &str) -> String {
    if path.starts_with('/') {
        path.to_string()
    } else {
        format!("/{path}")
    }
}

/// Parse rule lines, skipping blanks and `#` comments.
fn parse_rules(text: &str) -> Vec<AccessRule> {
    text.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .filter_map(|line| {
            let mut fields = line.split_whitespace();
            Some(AccessRule {
                subject: fields.next()?.to_string(),
                access: fields.next()?.to_string(),
                target: fields.next()?.to_string(),
            })
        })
        .collect()
}

/// Parse `<group> <member> <member> …` lines into raw member lists.
fn parse_groups(text: &str) -> HashMap<String, Vec<String>> {
    let mut groups = HashMap::new();
    for line in text.lines() {
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }
        let mut fields = trimmed.split_whitespace();
        let Some(name) = fields.next() else { continue };
        groups.insert(
            name.to_string(),
            fields.map(ToString::to_string).collect::<Vec<_>>(),
        );
    }
    groups
}

/// Groups containing `user`, resolving `.group` references one level deep.
fn groups_containing(groups: &HashMap<String, Vec<String>>, user: &str) -> Vec<String> {
    let mut names: Vec<String> = groups
        .iter()
        .filter(|(_, members)| {
            members.iter().any(|member| {
                if let Some(reference) = member.strip_prefix('.') {
                    groups
                        .get(reference)
                        .is_some_and(|inner| inner.iter().any(|m| m == user))
                } else {
                    member == user
                }
            })
        })
        .map(|(name, _)| name.clone())
        .collect();
    names.sort();
    names
}

pub struct AccessEvaluator {
    store: Store,
}

impl AccessEvaluator {
    #[must_use]
    pub fn new(store: Store) -> Self {
        Self { store }
    }

    async fn rules_at(&self, path: &str) -> Result<Vec<AccessRule>, StoreError> {
        match self.store.load_text(path).await {
            Ok(text) => Ok(parse_rules(&text)),
            Err(err) if err.is_not_found() => Ok(Vec::new()),
            Err(err) => Err(err),
        }
    }

    async fn groups(&self) -> Result<HashMap<String, Vec<String>>, StoreError> {
        match self.store.load_text(GROUPS_PATH).await {
            Ok(text) => Ok(parse_groups(&text)),
            Err(err) if err.is_not_found() => Ok(HashMap::new()),
            Err(err) => Err(err),
        }
    }

    /// Decide whether `user` may act on `path` at `level`.
    pub async fn check(
        &self,
        user: &str,
        path: &str,
        level: AccessLevel,
    ) -> Result<bool, StoreError> {
        for rule in self.rules_at(&users::access_path(user)).await? {
            if rule.matches(path, level) {
                return Ok(true);
            }
        }

        let global = self.rules_at(GLOBAL_RULES_PATH).await?;
        let memberships = groups_containing(&self.groups().await?, user);
        for rule in &global {
            if memberships.iter().any(|group| group == &rule.subject)
                && rule.matches(path, level)
            {
                return Ok(true);
            }
        }
        for rule in &global {
            if rule.subject == "*" && rule.matches(path, level) {
                return Ok(true);
            }
        }
        Ok(false)
    }

    /// The rules and groups that apply to `user`.
    pub async fn info(&self, user: &str) -> Result<AccessInfo, StoreError> {
        let user_access = self.rules_at(&users::access_path(user)).await?;
        let global = self.rules_at(GLOBAL_RULES_PATH).await?;
        let groups = groups_containing(&self.groups().await?, user);
        let group_rules = global
            .iter()
            .filter(|rule| groups.iter().any(|group| group == &rule.subject))
            .cloned()
            .collect();
        let global_rules = global
            .into_iter()
            .filter(|rule| rule.subject == "*")
            .collect();
        Ok(AccessInfo {
            user_access,
            group_rules,
            global_rules,
            groups,
        })
    }
}
