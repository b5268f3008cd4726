//! Partial updates over JSON: objects merge key by key, `null` deletes a key,
//! anything else (arrays included) replaces the previous value.

use serde::{de::DeserializeOwned, Serialize};
use serde_json::{Map, Value};

use crate::errors::AppError;
use crate::validation::from_json;

pub fn merge_value(target: &mut Value, patch: Value) {
    match (target, patch) {
        (Value::Object(target), Value::Object(patch)) => {
            for (key, value) in patch {
                if value.is_null() {
                    target.remove(&key);
                } else {
                    match target.get_mut(&key) {
                        Some(existing) if existing.is_object() && value.is_object() => {
                            merge_value(existing, value)
                        }
                        _ => {
                            target.insert(key, value);
                        }
                    }
                }
            }
        }
        (target, patch) => *target = patch,
    }
}

/// Applies `patch` to a typed value by round-tripping it through JSON.
/// Unknown or ill-typed fields surface as a 400 naming `what`.
pub fn apply_patch<T>(what: &str, current: &T, patch: Map<String, Value>) -> Result<T, AppError>
where
    T: Serialize + DeserializeOwned,
{
    let mut value = serde_json::to_value(current).map_err(anyhow::Error::from)?;
    merge_value(&mut value, Value::Object(patch));
    from_json(what, value)
}

/// Removes a boolean control flag such as `remove_logo` from a patch.
pub fn take_flag(fields: &mut Map<String, Value>, name: &str) -> Result<bool, AppError> {
    match fields.remove(name) {
        None | Some(Value::Null) => Ok(false),
        Some(Value::Bool(b)) => Ok(b),
        Some(other) => Err(AppError::Validation(format!(
            "{name} must be a boolean, got {other}"
        ))),
    }
}
