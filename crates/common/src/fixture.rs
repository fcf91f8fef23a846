//! Static fixture data
//!
//! A fixture is a JSON object whose top-level keys name records such as
//! `validUser` or `payee`. User records follow the registration form
//! layout; every leaf value is also exposed as a dotted binding
//! (`validUser.address.city`) for scenario templates.

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{Error, Result};
use crate::types::Credential;

/// Postal address of a user record
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Address {
    pub street: String,
    pub city: String,
    pub state: String,
    pub zip_code: String,
}

/// A registration-shaped identity record
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserRecord {
    pub first_name: String,
    pub last_name: String,
    pub address: Address,
    pub phone_number: String,
    pub ssn: String,
    pub username: String,
    pub password: String,
}

impl UserRecord {
    pub fn credential(&self) -> Credential {
        Credential::new(&self.username, &self.password).with_display_name(self.full_name())
    }

    pub fn full_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
    }
}

/// Parsed fixture file
#[derive(Debug, Clone, Default)]
pub struct Fixture {
    records: Map<String, Value>,
}

impl Fixture {
    /// Parse a fixture from a JSON string
    pub fn from_json(json: &str) -> Result<Self> {
        match serde_json::from_str::<Value>(json)? {
            Value::Object(records) => Ok(Self { records }),
            other => Err(Error::Fixture(format!(
                "fixture root must be an object, got {}",
                type_name(&other)
            ))),
        }
    }

    /// Load a fixture from a JSON file
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let fixture = Self::from_json(&content)?;
        tracing::debug!(path = %path.display(), records = fixture.records.len(), "loaded fixture");
        Ok(fixture)
    }

    /// Names of all top-level records
    pub fn record_names(&self) -> impl Iterator<Item = &str> {
        self.records.keys().map(String::as_str)
    }

    /// Typed view of a user record
    pub fn user(&self, identity: &str) -> Result<UserRecord> {
        let value = self
            .records
            .get(identity)
            .ok_or_else(|| Error::IdentityNotFound(identity.to_string()))?;
        serde_json::from_value(value.clone())
            .map_err(|e| Error::Fixture(format!("record '{}' is not a user: {}", identity, e)))
    }

    /// Credential of a named identity.
    ///
    /// Only `username` and `password` are required, so partial records
    /// such as `invalidUser` still resolve.
    pub fn credential(&self, identity: &str) -> Result<Credential> {
        let record = self
            .records
            .get(identity)
            .ok_or_else(|| Error::IdentityNotFound(identity.to_string()))?;
        let field = |name: &str| {
            record
                .get(name)
                .and_then(Value::as_str)
                .map(str::to_string)
                .ok_or_else(|| Error::Fixture(format!("record '{}' has no {}", identity, name)))
        };
        let credential = Credential::new(field("username")?, field("password")?);
        let name = |key: &str| record.get(key).and_then(Value::as_str);
        Ok(match (name("firstName"), name("lastName")) {
            (Some(first), Some(last)) => credential.with_display_name(format!("{} {}", first, last)),
            _ => credential,
        })
    }

    /// Flatten every scalar leaf into dotted binding names
    pub fn bindings(&self) -> BTreeMap<String, String> {
        let mut out = BTreeMap::new();
        for (key, value) in &self.records {
            flatten(key, value, &mut out);
        }
        out
    }
}

fn flatten(prefix: &str, value: &Value, out: &mut BTreeMap<String, String>) {
    match value {
        Value::Object(map) => {
            for (key, child) in map {
                flatten(&format!("{}.{}", prefix, key), child, out);
            }
        }
        Value::Array(items) => {
            for (i, child) in items.iter().enumerate() {
                flatten(&format!("{}.{}", prefix, i), child, out);
            }
        }
        Value::String(s) => {
            out.insert(prefix.to_string(), s.clone());
        }
        Value::Number(n) => {
            out.insert(prefix.to_string(), n.to_string());
        }
        Value::Bool(b) => {
            out.insert(prefix.to_string(), b.to_string());
        }
        Value::Null => {}
    }
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const FIXTURE: &str = r#"{
        "validUser": {
            "firstName": "Alice",
            "lastName": "Right",
            "address": {
                "street": "123 Test Street",
                "city": "Red Deer",
                "state": "Alberta",
                "zipCode": "T4E 0B2"
            },
            "phoneNumber": "+1234567890",
            "ssn": "123456789",
            "username": "AliceTestUser",
            "password": "TestPassword123"
        },
        "invalidUser": {
            "username": "InvalidUser",
            "password": "WrongPassword"
        }
    }"#;

    #[test]
    fn test_typed_user_record() {
        let fixture = Fixture::from_json(FIXTURE).unwrap();
        let user = fixture.user("validUser").unwrap();
        assert_eq!(user.full_name(), "Alice Right");
        assert_eq!(user.address.zip_code, "T4E 0B2");
        assert_eq!(user.credential(), Credential::new("AliceTestUser", "TestPassword123"));
    }

    #[test]
    fn test_partial_record_still_yields_credential() {
        let fixture = Fixture::from_json(FIXTURE).unwrap();
        assert!(fixture.user("invalidUser").is_err());
        let cred = fixture.credential("invalidUser").unwrap();
        assert_eq!(cred.username, "InvalidUser");
        assert_eq!(cred.display_name, None);
        assert_eq!(
            fixture.credential("validUser").unwrap().display_name.as_deref(),
            Some("Alice Right")
        );
    }

    #[test]
    fn test_unknown_identity() {
        let fixture = Fixture::from_json(FIXTURE).unwrap();
        assert!(matches!(
            fixture.credential("nobody"),
            Err(Error::IdentityNotFound(name)) if name == "nobody"
        ));
    }

    #[test]
    fn test_bindings_are_dotted() {
        let fixture = Fixture::from_json(FIXTURE).unwrap();
        let bindings = fixture.bindings();
        assert_eq!(bindings["validUser.address.city"], "Red Deer");
        assert_eq!(bindings["invalidUser.username"], "InvalidUser");
    }

    #[test]
    fn test_root_must_be_object() {
        assert!(matches!(Fixture::from_json("[1, 2]"), Err(Error::Fixture(_))));
    }
}
