use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::Value;

use crate::models::{Appointment, DocbookSettings, FocusSession, FocusSettings, PetState};

/// A whole-app document persisted under one storage key.
pub trait Snapshot: Serialize + DeserializeOwned + Default {
    const STORAGE_KEY: &'static str;
    /// Backup files are named `<prefix>-backup-<date>.json`.
    const BACKUP_PREFIX: &'static str;
    /// Top-level fields an imported file must contain.
    const REQUIRED_SECTIONS: &'static [&'static str];
    /// Keys older data stored under another name, as `(section, old, new)`.
    const RENAMED_FIELDS: &'static [(&'static str, &'static str, &'static str)] = &[];
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct FocusSnapshot {
    pub settings: FocusSettings,
    pub sessions: Vec<FocusSession>,
    pub pet: PetState,
}

impl Snapshot for FocusSnapshot {
    const STORAGE_KEY: &'static str = "focuspal_data_v1";
    const BACKUP_PREFIX: &'static str = "focuspal";
    const REQUIRED_SECTIONS: &'static [&'static str] = &["settings", "sessions", "pet"];
    const RENAMED_FIELDS: &'static [(&'static str, &'static str, &'static str)] =
        &[("pet", "xp", "experience")];
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct DocbookSnapshot {
    pub settings: DocbookSettings,
    pub appointments: Vec<Appointment>,
}

impl Snapshot for DocbookSnapshot {
    const STORAGE_KEY: &'static str = "docbook_data_v2";
    const BACKUP_PREFIX: &'static str = "docbook";
    const REQUIRED_SECTIONS: &'static [&'static str] = &["settings", "appointments"];
}

/// Builds a `T` from stored JSON: legacy keys are renamed, then the result is laid over
/// the defaults with [`merge_over_defaults`].
pub fn from_stored<T: Snapshot>(stored: &Value) -> serde_json::Result<T> {
    let defaults = serde_json::to_value(T::default())?;
    let mut stored = stored.clone();
    rename_legacy_fields(&mut stored, T::RENAMED_FIELDS);
    serde_json::from_value(merge_over_defaults(defaults, &stored))
}

/// Moves each `old` key to `new` inside its section. A value already under `new` wins.
fn rename_legacy_fields(stored: &mut Value, renames: &[(&str, &str, &str)]) {
    for (section, old, new) in renames {
        let Some(Value::Object(fields)) = stored.get_mut(*section) else {
            continue;
        };
        if let Some(value) = fields.remove(*old) {
            if !fields.contains_key(*new) {
                fields.insert((*new).to_string(), value);
            }
        }
    }
}

/// Lays `stored` over the serialized defaults one section at a time.
///
/// Object sections take every stored key over the default keys. Array sections are
/// replaced only by an array. Anything else in `stored` is ignored.
pub fn merge_over_defaults(defaults: Value, stored: &Value) -> Value {
    let (Value::Object(mut merged), Value::Object(stored)) = (defaults, stored) else {
        return Value::Null;
    };

    for (section, default_value) in merged.iter_mut() {
        let Some(stored_value) = stored.get(section) else {
            continue;
        };
        match stored_value {
            Value::Object(stored_fields) => {
                if let Value::Object(fields) = default_value {
                    for (key, value) in stored_fields {
                        fields.insert(key.clone(), value.clone());
                    }
                }
            }
            Value::Array(items) if default_value.is_array() => {
                *default_value = Value::Array(items.clone());
            }
            _ => {}
        }
    }

    Value::Object(merged)
}
