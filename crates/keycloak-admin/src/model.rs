//! Admin API representations.
//!
//! These mirror the JSON shapes of the Keycloak admin REST API, restricted to
//! the fields the reproducer reads or writes.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Provider id of LDAP user federation components.
pub const LDAP_PROVIDER_ID: &str = "ldap";

/// Provider type of user storage components.
pub const USER_STORAGE_PROVIDER_TYPE: &str = "org.keycloak.storage.UserStorageProvider";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RealmRepresentation {
    pub id: String,
    pub realm: String,
}

/// A configuration component registered on a realm.
///
/// Every config value is a list of strings on the wire, even single values.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ComponentRepresentation {
    /// Server-assigned id, absent on creation.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub name: String,
    pub provider_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provider_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<String>,
    #[serde(default)]
    pub config: BTreeMap<String, Vec<String>>,
}

impl ComponentRepresentation {
    /// Builds a user storage component from single-valued config entries.
    pub fn user_storage<I, K, V>(name: &str, provider_id: &str, parent_id: &str, config: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            id: None,
            name: name.to_string(),
            provider_id: provider_id.to_string(),
            provider_type: Some(USER_STORAGE_PROVIDER_TYPE.to_string()),
            parent_id: Some(parent_id.to_string()),
            config: config
                .into_iter()
                .map(|(k, v)| (k.into(), vec![v.into()]))
                .collect(),
        }
    }

    /// First value of a config entry.
    pub fn config_value(&self, key: &str) -> Option<&str> {
        self.config
            .get(key)
            .and_then(|values| values.first())
            .map(String::as_str)
    }
}

/// Query parameters of the user search endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserQuery {
    pub max: u32,
    pub username: Option<String>,
}

impl UserQuery {
    /// Single-result search for a username that never exists.
    pub fn unknown_user() -> Self {
        Self {
            max: 1,
            username: Some("unknown".to_string()),
        }
    }

    pub(crate) fn to_pairs(&self) -> Vec<(&'static str, String)> {
        let mut pairs = vec![("max", self.max.to_string())];
        if let Some(username) = &self.username {
            pairs.push(("username", username.clone()));
        }
        pairs
    }
}

/// Synchronization actions of a user storage provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SyncAction {
    ChangedUsers,
}

impl SyncAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            SyncAction::ChangedUsers => "triggerChangedUsersSync",
        }
    }
}

impl std::fmt::Display for SyncAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
