use serde::Serialize;
use serde_json::{ser::PrettyFormatter, Map, Serializer, Value};
use stash_core::{
    keys::{CanonicalKey, CipherFn, Indent, ReplacerFn},
    storage::{Storage, StorageError},
    warn::{WarnSink, Warning},
    State,
};
use thiserror::Error;
use tracing::instrument;

// JSON.stringify caps indentation at 10 columns; mirrored here.
const MAX_INDENT: usize = 10;

#[derive(Debug, Error)]
enum WriteError {
    #[error(transparent)]
    Storage(#[from] StorageError),
    #[error("serialization failed: {0}")]
    Render(#[from] serde_json::Error),
    #[error("rendered JSON is not valid UTF-8: {0}")]
    Utf8(#[from] std::string::FromUtf8Error),
}

/// Persist one storage entry per key from the post-update state.
///
/// Never propagates: every storage or serialization failure is caught at the
/// individual key and reported as a warning, so the caller's update flow is
/// preserved and the remaining keys still process. A missing slice removes
/// the entry when `remove_on_missing` is set and is a no-op otherwise.
#[instrument(skip_all, fields(keys = keys.len()))]
pub fn sync_state<S: Storage>(
    state: &State,
    keys: &[CanonicalKey],
    storage: &S,
    remove_on_missing: bool,
    warn: &dyn WarnSink,
) {
    for key in keys {
        let name = key.name();
        let slice = state.get(name);

        // serialize fully determines the stored shape; filter reads the
        // original slice and applies only when serialize is absent.
        let transformed = match key.options() {
            Some(options) => {
                if let Some(serialize) = &options.serialize {
                    serialize(slice)
                } else if let Some(fields) = &options.filter {
                    match slice {
                        Some(Value::Object(source)) => Some(Value::Object(pick_fields(fields, source))),
                        Some(_) => Some(Value::Object(Map::new())),
                        None => None,
                    }
                } else {
                    slice.cloned()
                }
            }
            None => slice.cloned(),
        };

        let encrypt = key.cipher(warn).map(|(encrypt, _)| encrypt);
        let replacer = key.options().and_then(|options| options.replacer.as_ref());
        let space = key.options().and_then(|options| options.space.as_ref());

        match transformed {
            Some(value) => {
                if let Err(err) = write_slice(storage, name, value, encrypt, replacer, space) {
                    warn.warn(Warning::WriteFailed {
                        key: name.to_string(),
                        reason: err.to_string(),
                    });
                }
            }
            None if remove_on_missing => {
                if let Err(err) = storage.remove(name) {
                    warn.warn(Warning::RemoveFailed {
                        key: name.to_string(),
                        reason: err.to_string(),
                    });
                }
            }
            None => {}
        }
    }
}

fn write_slice<S: Storage>(
    storage: &S,
    name: &str,
    value: Value,
    encrypt: Option<&CipherFn>,
    replacer: Option<&ReplacerFn>,
    space: Option<&Indent>,
) -> Result<(), WriteError> {
    let text = match value {
        // custom serializers may hand back an opaque string; stored untouched
        Value::String(text) => text,
        other => {
            let pruned = match replacer {
                Some(replacer) => apply_replacer("", other, replacer),
                None => Some(other),
            };
            match pruned {
                Some(value) => render(&value, space)?,
                // replacer dropped the root; nothing to store
                None => return Ok(()),
            }
        }
    };
    let text = match encrypt {
        Some(encrypt) => encrypt(&text),
        None => text,
    };
    storage.set(name, &text)?;
    Ok(())
}

fn pick_fields(fields: &[String], source: &Map<String, Value>) -> Map<String, Value> {
    let mut subset = Map::new();
    for field in fields {
        if let Some(value) = source.get(field) {
            subset.insert(field.clone(), value.clone());
        }
    }
    subset
}

fn apply_replacer(key: &str, value: Value, replacer: &ReplacerFn) -> Option<Value> {
    let value = replacer(key, &value)?;
    Some(match value {
        Value::Object(map) => Value::Object(
            map.into_iter()
                .filter_map(|(name, member)| {
                    let kept = apply_replacer(&name, member, replacer)?;
                    Some((name, kept))
                })
                .collect(),
        ),
        Value::Array(items) => Value::Array(
            items
                .into_iter()
                .enumerate()
                .map(|(index, item)| {
                    apply_replacer(&index.to_string(), item, replacer).unwrap_or(Value::Null)
                })
                .collect(),
        ),
        other => other,
    })
}

fn render(value: &Value, space: Option<&Indent>) -> Result<String, WriteError> {
    let indent = match space {
        Some(Indent::Spaces(n)) => " ".repeat((*n as usize).min(MAX_INDENT)),
        Some(Indent::Text(text)) => text.chars().take(MAX_INDENT).collect(),
        None => String::new(),
    };
    if indent.is_empty() {
        return Ok(serde_json::to_string(value)?);
    }
    let mut buf = Vec::new();
    let mut ser = Serializer::with_formatter(&mut buf, PrettyFormatter::with_indent(indent.as_bytes()));
    value.serialize(&mut ser)?;
    Ok(String::from_utf8(buf)?)
}
