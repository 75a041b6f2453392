//! Field schema definitions.
//!
//! Incident fields are dynamically named but statically kinded: every field
//! is declared up front with a kind (and, for enumerations, the set of legal
//! values), and the store validates each write against that declaration.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Declared kind of an incident field.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum FieldKind {
    /// Long free text (e.g., a ransom note body).
    Text,
    /// Short scalar string.
    Scalar,
    /// One of a fixed set of allowed values.
    Enumeration,
    /// List of strings.
    StringList,
    /// List of structured sub-objects (JSON records).
    RecordList,
}

impl std::fmt::Display for FieldKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FieldKind::Text => write!(f, "text"),
            FieldKind::Scalar => write!(f, "scalar"),
            FieldKind::Enumeration => write!(f, "enumeration"),
            FieldKind::StringList => write!(f, "string_list"),
            FieldKind::RecordList => write!(f, "record_list"),
        }
    }
}

/// Declaration of a single field.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FieldSchema {
    /// Field name, unique within an incident.
    pub name: String,
    /// Declared kind.
    pub kind: FieldKind,
    /// Legal values for enumeration fields.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub allowed_values: Vec<String>,
}

impl FieldSchema {
    /// Declares a field of the given kind.
    pub fn new(name: impl Into<String>, kind: FieldKind) -> Self {
        Self {
            name: name.into(),
            kind,
            allowed_values: Vec::new(),
        }
    }

    /// Declares an enumeration field with its legal values.
    pub fn enumeration(
        name: impl Into<String>,
        allowed_values: impl IntoIterator<Item = impl Into<String>>,
    ) -> Self {
        Self {
            name: name.into(),
            kind: FieldKind::Enumeration,
            allowed_values: allowed_values.into_iter().map(Into::into).collect(),
        }
    }

    /// Whether a value is legal for this field's enumeration.
    pub fn allows(&self, value: &str) -> bool {
        self.kind != FieldKind::Enumeration || self.allowed_values.iter().any(|v| v == value)
    }
}

/// A named collection of field declarations.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FieldSchemaSet {
    fields: HashMap<String, FieldSchema>,
}

impl FieldSchemaSet {
    /// Creates an empty schema set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a field declaration.
    pub fn with_field(mut self, field: FieldSchema) -> Self {
        self.fields.insert(field.name.clone(), field);
        self
    }

    /// Looks up a field declaration by name.
    pub fn get(&self, name: &str) -> Option<&FieldSchema> {
        self.fields.get(name)
    }

    /// Whether a field is declared.
    pub fn contains(&self, name: &str) -> bool {
        self.fields.contains_key(name)
    }

    /// Iterates over all declarations.
    pub fn iter(&self) -> impl Iterator<Item = &FieldSchema> {
        self.fields.values()
    }

    /// Number of declared fields.
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    /// Whether no fields are declared.
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

/// Canonical field names for the ransomware incident type.
pub mod names {
    pub const RANSOM_NOTE: &str = "Ransomware Note";
    pub const RECOVERY_TOOL: &str = "Ransomware Recovery Tool";
    pub const ONION_ADDRESS: &str = "Ransomware Onion Address";
    pub const STRAIN: &str = "Ransomware Strain";
    pub const ENCRYPTED_ENDPOINTS: &str = "Ransomware Approximate Number Of Encrypted Endpoints";
    pub const CRYPTO_ADDRESS: &str = "Ransomware Cryptocurrency Address";
    pub const ENCRYPTION_STATUS: &str = "Ransomware Data Encryption Status";
    pub const USERS: &str = "Users";
    pub const HOSTS: &str = "Hosts";
    pub const ENCRYPTED_FILE_OWNER: &str = "Ransomware Encrypted File Owner";
    pub const EMAIL: &str = "Ransomware Email";
    pub const CRYPTO_ADDRESS_TYPE: &str = "Ransomware Cryptocurrency Address Type";
}

/// Legal values for the data encryption status enumeration.
pub const ENCRYPTION_STATUS_VALUES: [&str; 4] = ["Unknown", "Confirmed", "Decrypting", "Recovered"];

/// Builds the field schema for "Post Intrusion Ransomware" incidents.
pub fn ransomware_schema() -> FieldSchemaSet {
    FieldSchemaSet::new()
        .with_field(FieldSchema::new(names::RANSOM_NOTE, FieldKind::Text))
        .with_field(FieldSchema::new(names::RECOVERY_TOOL, FieldKind::Scalar))
        .with_field(FieldSchema::new(names::ONION_ADDRESS, FieldKind::StringList))
        .with_field(FieldSchema::new(names::STRAIN, FieldKind::Scalar))
        .with_field(FieldSchema::new(
            names::ENCRYPTED_ENDPOINTS,
            FieldKind::Scalar,
        ))
        .with_field(FieldSchema::new(
            names::CRYPTO_ADDRESS,
            FieldKind::StringList,
        ))
        .with_field(FieldSchema::enumeration(
            names::ENCRYPTION_STATUS,
            ENCRYPTION_STATUS_VALUES,
        ))
        .with_field(FieldSchema::new(names::USERS, FieldKind::RecordList))
        .with_field(FieldSchema::new(names::HOSTS, FieldKind::RecordList))
        .with_field(FieldSchema::new(
            names::ENCRYPTED_FILE_OWNER,
            FieldKind::Scalar,
        ))
        .with_field(FieldSchema::new(names::EMAIL, FieldKind::StringList))
        .with_field(FieldSchema::new(
            names::CRYPTO_ADDRESS_TYPE,
            FieldKind::StringList,
        ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ransomware_schema_declares_twelve_fields() {
        let schema = ransomware_schema();
        assert_eq!(schema.len(), 12);
        assert!(schema.contains(names::RANSOM_NOTE));
        assert!(schema.contains(names::CRYPTO_ADDRESS_TYPE));
    }

    #[test]
    fn test_encryption_status_enumeration() {
        let schema = ransomware_schema();
        let status = schema.get(names::ENCRYPTION_STATUS).unwrap();

        assert_eq!(status.kind, FieldKind::Enumeration);
        assert!(status.allows("Confirmed"));
        assert!(status.allows("Recovered"));
        assert!(!status.allows("Encrypted"));
    }

    #[test]
    fn test_non_enumeration_allows_anything() {
        let field = FieldSchema::new("Notes", FieldKind::Text);
        assert!(field.allows("arbitrary text"));
    }

    #[test]
    fn test_schema_serialization_roundtrip() {
        let schema = ransomware_schema();
        let json = serde_json::to_string(&schema).unwrap();
        let back: FieldSchemaSet = serde_json::from_str(&json).unwrap();

        assert_eq!(back.len(), 12);
        assert_eq!(
            back.get(names::ENCRYPTION_STATUS).unwrap().allowed_values,
            ENCRYPTION_STATUS_VALUES.to_vec()
        );
    }
}
