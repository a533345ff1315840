use std::collections::BTreeMap;

use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::errors::{Result, ServiceError};
use crate::sanitize::sanitize_username;

/// Store path of the whole user collection.
pub const USERS_PATH: &str = "users";

/// Store path of the `userName -> id` index document.
pub const NAME_INDEX_PATH: &str = "userIDByUsername";

/// Opaque account identifier, as issued by the auth provider.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(String);

impl UserId {
    pub fn from_string(s: &str) -> Result<Self> {
        if s.is_empty() || s.contains('/') {
            return Err(ServiceError::Validation(format!("Invalid user ID: {:?}", s)));
        }
        Ok(Self(s.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Path of this user's record, `users/<id>`.
    pub fn record_path(&self) -> String {
        format!("{}/{}", USERS_PATH, self.0)
    }
}

impl std::fmt::Display for UserId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A sanitized username that satisfies the length rules.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Username(String);

impl Username {
    pub const MIN_LENGTH: usize = 5;
    pub const MAX_LENGTH: usize = 10;

    /// Sanitizes `raw` and validates the result.
    pub fn from_candidate(raw: &str) -> Result<Self> {
        let sanitized = sanitize_username(raw);
        Self::validate_length(&sanitized)?;
        Ok(Self(sanitized))
    }

    /// Length is counted in characters, not bytes.
    pub fn validate_length(username: &str) -> Result<()> {
        let len = username.chars().count();

        if len < Self::MIN_LENGTH {
            return Err(ServiceError::InvalidUsername(format!(
                "Username must be at least {} characters",
                Self::MIN_LENGTH
            )));
        }

        if len > Self::MAX_LENGTH {
            return Err(ServiceError::InvalidUsername(format!(
                "Username must be at most {} characters",
                Self::MAX_LENGTH
            )));
        }

        Ok(())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Path of this name's single index entry, `userIDByUsername/<name>`.
    pub fn index_entry_path(&self) -> String {
        format!("{}/{}", NAME_INDEX_PATH, self.0)
    }
}

impl std::fmt::Display for Username {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Primary account document stored at `users/<id>`.
///
/// Only `id` and `userName` are interpreted; every other field is carried
/// through reads and writes untouched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserRecord {
    pub id: UserId,
    #[serde(rename = "userName")]
    pub user_name: String,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl UserRecord {
    pub fn new(id: UserId, user_name: impl Into<String>) -> Self {
        Self {
            id,
            user_name: user_name.into(),
            extra: serde_json::Map::new(),
        }
    }

    /// Copy of this record carrying `new_name`.
    pub fn renamed(&self, new_name: &Username) -> Self {
        Self {
            user_name: new_name.as_str().to_string(),
            ..self.clone()
        }
    }
}

/// The denormalized `userName -> id` lookup document.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NameIndex(BTreeMap<String, UserId>);

impl NameIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn lookup(&self, user_name: &str) -> Option<&UserId> {
        self.0.get(user_name)
    }

    pub fn insert(&mut self, user_name: impl Into<String>, user_id: UserId) -> Option<UserId> {
        self.0.insert(user_name.into(), user_id)
    }

    pub fn remove(&mut self, user_name: &str) -> Option<UserId> {
        self.0.remove(user_name)
    }

    /// Moves `user_id` from `old_name` to `new_name`.
    ///
    /// The old entry is only removed when it still points at `user_id`, so a
    /// name already re-claimed by someone else is left alone.
    pub fn apply_rename(&mut self, old_name: &str, new_name: &Username, user_id: &UserId) {
        if self.0.get(old_name) == Some(user_id) {
            self.0.remove(old_name);
        }
        self.0.insert(new_name.as_str().to_string(), user_id.clone());
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &UserId)> {
        self.0.iter()
    }
}

impl FromIterator<(String, UserId)> for NameIndex {
    fn from_iter<I: IntoIterator<Item = (String, UserId)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

/// Wall-clock milliseconds since the Unix epoch.
pub fn now_millis() -> i64 {
    Utc::now().timestamp_millis()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_username_from_candidate() {
        assert_eq!(Username::from_candidate("ValidName").unwrap().as_str(), "validname");
        assert!(Username::from_candidate("ab").is_err(), "Too short");
        assert!(Username::from_candidate("abcdefghijk").is_err(), "Too long");
        assert!(Username::from_candidate("").is_err(), "Empty");
        assert!(
            Username::from_candidate("<b>ab</b>c").is_err(),
            "Too short once markup is gone"
        );
        assert_eq!(Username::from_candidate("abcdefghij").unwrap().as_str(), "abcdefghij");
    }

    #[test]
    fn test_username_length_counts_chars() {
        assert!(Username::validate_length("ééééé").is_ok());
        assert!(Username::validate_length("éééééééééé").is_ok());
        assert!(Username::validate_length("ééééééééééé").is_err());
    }

    #[test]
    fn test_user_id_rejects_path_separators() {
        assert!(UserId::from_string("abc").is_ok());
        assert!(UserId::from_string("").is_err());
        assert!(UserId::from_string("a/b").is_err());
    }

    #[test]
    fn test_paths() {
        let id = UserId::from_string("u42").unwrap();
        assert_eq!(id.record_path(), "users/u42");
        let name = Username::from_candidate("validname").unwrap();
        assert_eq!(name.index_entry_path(), "userIDByUsername/validname");
    }

    #[test]
    fn test_user_record_keeps_unknown_fields() {
        let doc = json!({
            "id": "u1",
            "userName": "oldname",
            "email": "a@b.c",
            "chatRooms": ["general"]
        });

        let record: UserRecord = serde_json::from_value(doc.clone()).unwrap();
        assert_eq!(record.id.as_str(), "u1");
        assert_eq!(record.user_name, "oldname");

        let renamed = record.renamed(&Username::from_candidate("newname").unwrap());
        let out = serde_json::to_value(&renamed).unwrap();
        assert_eq!(out["userName"], "newname");
        assert_eq!(out["email"], "a@b.c");
        assert_eq!(out["chatRooms"], json!(["general"]));
    }

    #[test]
    fn test_name_index_apply_rename() {
        let alice = UserId::from_string("alice").unwrap();
        let bob = UserId::from_string("bob").unwrap();
        let mut index: NameIndex = [
            ("oldname".to_string(), alice.clone()),
            ("bobby".to_string(), bob.clone()),
        ]
        .into_iter()
        .collect();

        index.apply_rename("oldname", &Username::from_candidate("newname").unwrap(), &alice);

        assert_eq!(index.lookup("oldname"), None);
        assert_eq!(index.lookup("newname"), Some(&alice));
        assert_eq!(index.lookup("bobby"), Some(&bob));
        assert_eq!(index.len(), 2);
    }

    #[test]
    fn test_name_index_apply_rename_leaves_foreign_entry() {
        let alice = UserId::from_string("alice").unwrap();
        let bob = UserId::from_string("bob").unwrap();
        let mut index = NameIndex::new();
        index.insert("shared", bob.clone());

        index.apply_rename("shared", &Username::from_candidate("alice_new").unwrap(), &alice);

        assert_eq!(index.lookup("shared"), Some(&bob));
        assert_eq!(index.lookup("alice_new"), Some(&alice));
    }

    #[test]
    fn test_name_index_json_shape() {
        let mut index = NameIndex::new();
        index.insert("validname", UserId::from_string("u1").unwrap());
        assert_eq!(serde_json::to_value(&index).unwrap(), json!({ "validname": "u1" }));
    }
}
