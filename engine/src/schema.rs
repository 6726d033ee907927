//! Document schemas and migration.
//!
//! Every well-known storage key has a [`DocumentSchema`] describing the shape
//! of its JSON document. Schemas are used to validate imported data, and the
//! versioned ones drive [`migrate_document`].

use crate::{
    document::{GameStatistics, HighScoreBoard, UserPreferences, SCHEMA_VERSION, SUPPORTED_LOCALES},
    error::Result,
    Error, SchemaVersion,
};
use chrono::{DateTime, Utc};
use serde_json::{json, Map, Value};
use std::fmt;
use std::str::FromStr;

/// Field types supported in schemas.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldType {
    String,
    Int,
    Float,
    Bool,
    /// RFC 3339 string
    Timestamp,
    Array,
    Object,
    /// One of a closed set of strings
    OneOf(&'static [&'static str]),
    /// Arbitrary nested JSON
    Json,
}

impl fmt::Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldType::String => write!(f, "String"),
            FieldType::Int => write!(f, "Int"),
            FieldType::Float => write!(f, "Float"),
            FieldType::Bool => write!(f, "Bool"),
            FieldType::Timestamp => write!(f, "Timestamp"),
            FieldType::Array => write!(f, "Array"),
            FieldType::Object => write!(f, "Object"),
            FieldType::OneOf(values) => write!(f, "one of [{}]", values.join(", ")),
            FieldType::Json => write!(f, "Json"),
        }
    }
}

/// Definition of a field in a document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldDef {
    pub name: &'static str,
    pub field_type: FieldType,
    pub required: bool,
}

impl FieldDef {
    pub const fn required(name: &'static str, field_type: FieldType) -> Self {
        Self {
            name,
            field_type,
            required: true,
        }
    }

    pub const fn optional(name: &'static str, field_type: FieldType) -> Self {
        Self {
            name,
            field_type,
            required: false,
        }
    }

    /// Validate a JSON value against this field definition.
    pub fn validate(&self, value: Option<&Value>) -> Result<()> {
        match value {
            None | Some(Value::Null) if self.required => {
                Err(Error::validation(self.name, "missing required field"))
            }
            None | Some(Value::Null) => Ok(()),
            Some(v) => self.validate_type(v),
        }
    }

    fn validate_type(&self, value: &Value) -> Result<()> {
        let valid = match self.field_type {
            FieldType::String => value.is_string(),
            FieldType::Int => value.is_i64() || value.is_u64(),
            FieldType::Float => value.is_number(),
            FieldType::Bool => value.is_boolean(),
            FieldType::Timestamp => value
                .as_str()
                .is_some_and(|s| DateTime::parse_from_rfc3339(s).is_ok()),
            FieldType::Array => value.is_array(),
            FieldType::Object => value.is_object(),
            FieldType::OneOf(allowed) => value.as_str().is_some_and(|s| allowed.contains(&s)),
            FieldType::Json => true,
        };

        if valid {
            Ok(())
        } else {
            Err(Error::validation(
                self.name,
                format!("expected {}, got {}", self.field_type, json_type_name(value)),
            ))
        }
    }
}

fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "Null",
        Value::Bool(_) => "Bool",
        Value::Number(n) if n.is_i64() || n.is_u64() => "Int",
        Value::Number(_) => "Float",
        Value::String(_) => "String",
        Value::Array(_) => "Array",
        Value::Object(_) => "Object",
    }
}

/// Top-level shape of a document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DocumentShape {
    Object(&'static [FieldDef]),
    Array,
    String(Option<&'static [&'static str]>),
}

/// Schema of one well-known document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocumentSchema {
    pub key: DocumentKey,
    pub shape: DocumentShape,
}

impl DocumentSchema {
    /// Validate a document against this schema.
    pub fn validate(&self, document: &Value) -> Result<()> {
        match &self.shape {
            DocumentShape::Object(fields) => {
                let obj = document.as_object().ok_or_else(|| {
                    Error::validation(self.key.as_str(), "document must be an object")
                })?;
                for field in fields.iter() {
                    field.validate(obj.get(field.name))?;
                }
                Ok(())
            }
            DocumentShape::Array if document.is_array() => Ok(()),
            DocumentShape::Array => Err(Error::validation(
                self.key.as_str(),
                "document must be an array",
            )),
            DocumentShape::String(allowed) => match (document.as_str(), allowed) {
                (Some(s), Some(allowed)) if !allowed.contains(&s) => Err(Error::validation(
                    self.key.as_str(),
                    format!("unsupported value '{s}'"),
                )),
                (Some(_), _) => Ok(()),
                (None, _) => Err(Error::validation(
                    self.key.as_str(),
                    "document must be a string",
                )),
            },
        }
    }
}

const STATISTICS_FIELDS: &[FieldDef] = &[
    FieldDef::optional("version", FieldType::Int),
    FieldDef::optional("totalGames", FieldType::Int),
    FieldDef::optional("gamesWon", FieldType::Int),
    FieldDef::optional("gamesLost", FieldType::Int),
    FieldDef::optional("totalScore", FieldType::Int),
    FieldDef::optional("bestScore", FieldType::Int),
    FieldDef::optional("averageScore", FieldType::Float),
    FieldDef::optional("totalTimeSpent", FieldType::Int),
    FieldDef::optional("averageTime", FieldType::Float),
    FieldDef::optional("bestTime", FieldType::Int),
    FieldDef::optional("currentStreak", FieldType::Int),
    FieldDef::optional("bestStreak", FieldType::Int),
    FieldDef::optional("difficultyStats", FieldType::Object),
    FieldDef::optional("accuracyHistory", FieldType::Array),
    FieldDef::optional("session", FieldType::Object),
    FieldDef::optional("createdAt", FieldType::Timestamp),
    FieldDef::optional("updatedAt", FieldType::Timestamp),
    FieldDef::optional("lastPlayed", FieldType::Timestamp),
];

const PREFERENCE_FIELDS: &[FieldDef] = &[
    FieldDef::optional("version", FieldType::Int),
    FieldDef::optional("difficulty", FieldType::OneOf(&["easy", "medium", "hard"])),
    FieldDef::optional("soundEnabled", FieldType::Bool),
    FieldDef::optional("animationsEnabled", FieldType::Bool),
    FieldDef::optional("hintsEnabled", FieldType::Bool),
    FieldDef::optional("showTimer", FieldType::Bool),
    FieldDef::optional("colorFormat", FieldType::OneOf(&["hex", "rgb", "hsl"])),
    FieldDef::optional("theme", FieldType::OneOf(&["light", "dark", "auto"])),
    FieldDef::optional("accessibility", FieldType::Object),
    FieldDef::optional("locale", FieldType::OneOf(SUPPORTED_LOCALES)),
    FieldDef::optional("updatedAt", FieldType::Timestamp),
];

const HIGH_SCORE_FIELDS: &[FieldDef] = &[
    FieldDef::optional("version", FieldType::Int),
    FieldDef::required("scores", FieldType::Array),
];

const SETTINGS_FIELDS: &[FieldDef] = &[
    FieldDef::optional("version", FieldType::Int),
    FieldDef::optional("updatedAt", FieldType::Timestamp),
];

/// The storage keys the engine knows about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum DocumentKey {
    GameStatistics,
    UserPreferences,
    HighScores,
    GameHistory,
    Settings,
    Locale,
    Errors,
}

impl DocumentKey {
    pub const ALL: [DocumentKey; 7] = [
        DocumentKey::GameStatistics,
        DocumentKey::UserPreferences,
        DocumentKey::HighScores,
        DocumentKey::GameHistory,
        DocumentKey::Settings,
        DocumentKey::Locale,
        DocumentKey::Errors,
    ];

    /// Logical storage key, without prefix.
    pub fn as_str(self) -> &'static str {
        match self {
            DocumentKey::GameStatistics => "game_statistics",
            DocumentKey::UserPreferences => "user_preferences",
            DocumentKey::HighScores => "high_scores",
            DocumentKey::GameHistory => "game_history",
            DocumentKey::Settings => "settings",
            DocumentKey::Locale => "locale",
            DocumentKey::Errors => "errors",
        }
    }

    /// Whether the document carries a `version` tag and is migrated.
    pub fn is_versioned(self) -> bool {
        matches!(
            self,
            DocumentKey::GameStatistics
                | DocumentKey::UserPreferences
                | DocumentKey::HighScores
                | DocumentKey::Settings
        )
    }

    /// Schema for this document.
    pub fn schema(self) -> DocumentSchema {
        let shape = match self {
            DocumentKey::GameStatistics => DocumentShape::Object(STATISTICS_FIELDS),
            DocumentKey::UserPreferences => DocumentShape::Object(PREFERENCE_FIELDS),
            DocumentKey::HighScores => DocumentShape::Object(HIGH_SCORE_FIELDS),
            DocumentKey::Settings => DocumentShape::Object(SETTINGS_FIELDS),
            DocumentKey::GameHistory | DocumentKey::Errors => DocumentShape::Array,
            DocumentKey::Locale => DocumentShape::String(Some(SUPPORTED_LOCALES)),
        };
        DocumentSchema { key: self, shape }
    }

    /// Fresh default document created at `now`.
    pub fn default_document(self, now: DateTime<Utc>) -> Value {
        let document = match self {
            DocumentKey::GameStatistics => serde_json::to_value(GameStatistics::new(now)),
            DocumentKey::UserPreferences => serde_json::to_value(UserPreferences::default()),
            DocumentKey::HighScores => serde_json::to_value(HighScoreBoard::default()),
            DocumentKey::GameHistory | DocumentKey::Errors => Ok(json!([])),
            DocumentKey::Settings => Ok(json!({
                "version": SCHEMA_VERSION,
                "updatedAt": now.to_rfc3339(),
            })),
            DocumentKey::Locale => Ok(json!("en")),
        };
        // Plain structs of primitives; serialization cannot fail.
        document.unwrap_or(Value::Null)
    }
}

impl FromStr for DocumentKey {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        DocumentKey::ALL
            .into_iter()
            .find(|key| key.as_str() == s)
            .ok_or_else(|| Error::validation("key", format!("unknown document key '{s}'")))
    }
}

impl fmt::Display for DocumentKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Version tag of a stored document, if any.
pub fn document_version(document: &Value) -> Option<SchemaVersion> {
    document
        .get("version")
        .and_then(Value::as_u64)
        .and_then(|v| SchemaVersion::try_from(v).ok())
}

/// Whether a stored document predates [`SCHEMA_VERSION`].
pub fn needs_migration(document: &Value) -> bool {
    document_version(document).map_or(true, |v| v < SCHEMA_VERSION)
}

/// Recursively overlay `overlay` onto `base`; overlay wins on conflicts.
pub fn deep_merge(base: &mut Value, overlay: &Value) {
    match (base, overlay) {
        (Value::Object(base), Value::Object(overlay)) => {
            for (key, value) in overlay {
                let nested = value.is_object() && base.get(key).is_some_and(Value::is_object);
                match base.get_mut(key) {
                    Some(existing) if nested => deep_merge(existing, value),
                    _ => {
                        base.insert(key.clone(), value.clone());
                    }
                }
            }
        }
        (base, overlay) => *base = overlay.clone(),
    }
}

/// Overlay only the top-level keys of `overlay` onto `base`.
pub fn shallow_merge(base: &Map<String, Value>, overlay: &Map<String, Value>) -> Map<String, Value> {
    let mut merged = base.clone();
    for (key, value) in overlay {
        merged.insert(key.clone(), value.clone());
    }
    merged
}

/// Bring a stored document up to [`SCHEMA_VERSION`].
///
/// Stored fields are merged over a fresh default document, then the version
/// and `updatedAt` are stamped. Documents that are already current are
/// returned unchanged.
pub fn migrate_document(key: DocumentKey, stored: &Value, now: DateTime<Utc>) -> Result<Value> {
    if !key.is_versioned() || !needs_migration(stored) {
        return Ok(stored.clone());
    }
    if !stored.is_object() {
        return Err(Error::validation(
            key.as_str(),
            format!("cannot migrate a {} document", json_type_name(stored)),
        ));
    }

    let mut migrated = key.default_document(now);
    deep_merge(&mut migrated, stored);

    if let Value::Object(obj) = &mut migrated {
        obj.insert("version".into(), json!(SCHEMA_VERSION));
        obj.insert("updatedAt".into(), json!(now.to_rfc3339()));
    }
    Ok(migrated)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 2, 1, 12, 0, 0).unwrap()
    }

    #[test]
    fn validate_preferences() {
        let schema = DocumentKey::UserPreferences.schema();
        assert!(schema
            .validate(&json!({"theme": "dark", "soundEnabled": false}))
            .is_ok());

        let result = schema.validate(&json!({"theme": "neon"}));
        assert!(matches!(result, Err(Error::Validation { field, .. }) if field == "theme"));

        let result = schema.validate(&json!({"soundEnabled": "yes"}));
        assert!(matches!(result, Err(Error::Validation { field, .. }) if field == "soundEnabled"));
    }

    #[test]
    fn validate_required_field() {
        let schema = DocumentKey::HighScores.schema();
        assert!(schema.validate(&json!({"version": 2})).is_err());
        assert!(schema.validate(&json!({"scores": null})).is_err());
        assert!(schema.validate(&json!({"scores": []})).is_ok());
    }

    #[test]
    fn validate_shapes() {
        assert!(DocumentKey::GameHistory.schema().validate(&json!([])).is_ok());
        assert!(DocumentKey::GameHistory.schema().validate(&json!({})).is_err());
        assert!(DocumentKey::Locale.schema().validate(&json!("fr")).is_ok());
        assert!(DocumentKey::Locale.schema().validate(&json!("xx")).is_err());
        assert!(DocumentKey::Settings.schema().validate(&json!("x")).is_err());
    }

    #[test]
    fn timestamps_must_parse() {
        let schema = DocumentKey::GameStatistics.schema();
        assert!(schema
            .validate(&json!({"createdAt": "2024-02-01T12:00:00Z"}))
            .is_ok());
        assert!(schema.validate(&json!({"createdAt": "yesterday"})).is_err());
    }

    #[test]
    fn key_round_trip() {
        for key in DocumentKey::ALL {
            assert_eq!(key.as_str().parse::<DocumentKey>().unwrap(), key);
        }
        assert!("analytics_events".parse::<DocumentKey>().is_err());
    }

    #[test]
    fn defaults_pass_their_schema() {
        for key in DocumentKey::ALL {
            let doc = key.default_document(now());
            assert!(key.schema().validate(&doc).is_ok(), "{key}");
        }
    }

    #[test]
    fn migration_keeps_stored_values_and_adds_new_fields() {
        let stored = json!({"version": 1, "totalGames": 4, "gamesWon": 3, "gamesLost": 1});
        let migrated = migrate_document(DocumentKey::GameStatistics, &stored, now()).unwrap();

        assert_eq!(migrated["version"], SCHEMA_VERSION);
        assert_eq!(migrated["totalGames"], 4);
        assert_eq!(migrated["gamesWon"], 3);
        assert_eq!(migrated["accuracyHistory"], json!([]));
        assert_eq!(migrated["updatedAt"], now().to_rfc3339());

        let typed: GameStatistics = serde_json::from_value(migrated).unwrap();
        assert_eq!(typed.total_games, 4);
    }

    #[test]
    fn migration_merges_nested_objects() {
        let stored = json!({"accessibility": {"largeText": true}});
        let migrated = migrate_document(DocumentKey::UserPreferences, &stored, now()).unwrap();
        assert_eq!(migrated["accessibility"]["largeText"], true);
        assert_eq!(migrated["accessibility"]["highContrast"], false);
    }

    #[test]
    fn migration_is_idempotent() {
        let stored = json!({"theme": "dark"});
        let once = migrate_document(DocumentKey::UserPreferences, &stored, now()).unwrap();
        let later = now() + chrono::Duration::hours(1);
        let twice = migrate_document(DocumentKey::UserPreferences, &once, later).unwrap();
        assert_eq!(once, twice);
    }

    #[test]
    fn migration_rejects_non_objects() {
        let result = migrate_document(DocumentKey::HighScores, &json!([1, 2]), now());
        assert!(result.is_err());
    }

    #[test]
    fn shallow_merge_overwrites_only_present_keys() {
        let base = json!({"theme": "dark", "soundEnabled": false, "accessibility": {"largeText": true}});
        let overlay = json!({"theme": "light", "accessibility": {}});
        let merged = shallow_merge(
            base.as_object().unwrap(),
            overlay.as_object().unwrap(),
        );
        assert_eq!(merged["theme"], "light");
        assert_eq!(merged["soundEnabled"], false);
        assert_eq!(merged["accessibility"], json!({}));
    }
}
