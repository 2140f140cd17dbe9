use std::{fmt, sync::Arc};

use serde_json::Value;
use thiserror::Error;

use crate::warn::{WarnSink, Warning};

/// Parse-time hook invoked for every decoded value on rehydrate, innermost
/// values first; receives the member name (array indices as decimal strings,
/// `""` at the root).
pub type ReviverFn = Arc<dyn Fn(&str, Value) -> Value + Send + Sync>;

/// Applied to the parsed value on rehydrate, after the reviver.
pub type DeserializeFn = Arc<dyn Fn(Value) -> Value + Send + Sync>;

/// Applied to the raw state slice on sync, before stringification. Receives
/// the slice as stored in state (absent allowed) and fully determines the
/// stored shape; may itself return absent.
pub type SerializeFn = Arc<dyn Fn(Option<&Value>) -> Option<Value> + Send + Sync>;

/// One half of the encrypt/decrypt pair; transforms the stored string.
pub type CipherFn = Arc<dyn Fn(&str) -> String + Send + Sync>;

/// Stringification hook on sync; visits the value tree top-down. Returning
/// `None` drops an object member (array elements become `null`).
pub type ReplacerFn = Arc<dyn Fn(&str, &Value) -> Option<Value> + Send + Sync>;

/// Indentation for the stringification step on sync.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Indent {
    /// Indent by this many spaces per level, clamped at 10.
    Spaces(u8),
    /// Indent with a literal string per level, truncated at 10 characters.
    Text(String),
}

/// Per-key persistence options. All fields are optional and independently
/// settable; which fields apply depends on the path (`reviver`, `deserialize`
/// and `decrypt` on rehydrate; `serialize`, `filter`, `encrypt`, `replacer`
/// and `space` on sync).
#[derive(Clone, Default)]
pub struct KeyOptions {
    pub reviver: Option<ReviverFn>,
    pub deserialize: Option<DeserializeFn>,
    /// When present, supersedes `filter` entirely.
    pub serialize: Option<SerializeFn>,
    /// Top-level fields of the slice to persist, in this order. Used only
    /// when `serialize` is absent.
    pub filter: Option<Vec<String>>,
    pub encrypt: Option<CipherFn>,
    pub decrypt: Option<CipherFn>,
    pub replacer: Option<ReplacerFn>,
    pub space: Option<Indent>,
}

impl KeyOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_reviver(mut self, f: impl Fn(&str, Value) -> Value + Send + Sync + 'static) -> Self {
        self.reviver = Some(Arc::new(f));
        self
    }

    pub fn with_deserialize(mut self, f: impl Fn(Value) -> Value + Send + Sync + 'static) -> Self {
        self.deserialize = Some(Arc::new(f));
        self
    }

    pub fn with_serialize(
        mut self,
        f: impl Fn(Option<&Value>) -> Option<Value> + Send + Sync + 'static,
    ) -> Self {
        self.serialize = Some(Arc::new(f));
        self
    }

    pub fn with_filter<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.filter = Some(fields.into_iter().map(Into::into).collect());
        self
    }

    pub fn with_encrypt(mut self, f: impl Fn(&str) -> String + Send + Sync + 'static) -> Self {
        self.encrypt = Some(Arc::new(f));
        self
    }

    pub fn with_decrypt(mut self, f: impl Fn(&str) -> String + Send + Sync + 'static) -> Self {
        self.decrypt = Some(Arc::new(f));
        self
    }

    pub fn with_replacer(
        mut self,
        f: impl Fn(&str, &Value) -> Option<Value> + Send + Sync + 'static,
    ) -> Self {
        self.replacer = Some(Arc::new(f));
        self
    }

    pub fn with_space(mut self, indent: Indent) -> Self {
        self.space = Some(indent);
        self
    }
}

impl fmt::Debug for KeyOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyOptions")
            .field("reviver", &self.reviver.is_some())
            .field("deserialize", &self.deserialize.is_some())
            .field("serialize", &self.serialize.is_some())
            .field("filter", &self.filter)
            .field("encrypt", &self.encrypt.is_some())
            .field("decrypt", &self.decrypt.is_some())
            .field("replacer", &self.replacer.is_some())
            .field("space", &self.space)
            .finish()
    }
}

/// A persistence key as supplied at setup. The name is carried as a JSON value
/// so that name validation happens in one place, during normalization.
#[derive(Clone)]
pub enum RawKey {
    /// Persist the slice under this name as plain JSON.
    Bare(Value),
    /// Plain persistence, but rehydrate parses with this reviver instead of
    /// the default date reviver.
    WithReviver(Value, ReviverFn),
    /// Full options record.
    WithOptions(Value, KeyOptions),
}

impl RawKey {
    pub fn bare(name: impl Into<String>) -> Self {
        RawKey::Bare(Value::String(name.into()))
    }

    pub fn with_reviver(
        name: impl Into<String>,
        f: impl Fn(&str, Value) -> Value + Send + Sync + 'static,
    ) -> Self {
        RawKey::WithReviver(Value::String(name.into()), Arc::new(f))
    }

    pub fn with_options(name: impl Into<String>, options: KeyOptions) -> Self {
        RawKey::WithOptions(Value::String(name.into()), options)
    }

    /// Alias for the field-list-as-options shorthand: persist only the listed
    /// top-level fields of the slice. Equivalent to an options record carrying
    /// just `filter`.
    pub fn filtered<I, S>(name: impl Into<String>, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        RawKey::WithOptions(Value::String(name.into()), KeyOptions::new().with_filter(fields))
    }
}

impl From<&str> for RawKey {
    fn from(name: &str) -> Self {
        RawKey::bare(name)
    }
}

impl From<String> for RawKey {
    fn from(name: String) -> Self {
        RawKey::bare(name)
    }
}

impl fmt::Debug for RawKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RawKey::Bare(name) => f.debug_tuple("Bare").field(name).finish(),
            RawKey::WithReviver(name, _) => f.debug_tuple("WithReviver").field(name).finish(),
            RawKey::WithOptions(name, options) => {
                f.debug_tuple("WithOptions").field(name).field(options).finish()
            }
        }
    }
}

/// Setup-time key validation failures. These halt adapter construction.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum KeyError {
    /// The resolved key name is not a string.
    #[error("key name must be a string, got {kind}")]
    InvalidName { kind: &'static str },
}

/// A validated key, resolved once at normalization so neither path re-probes
/// the raw shape.
#[derive(Debug, Clone)]
pub struct CanonicalKey {
    name: String,
    kind: KeyKind,
}

#[derive(Clone)]
pub enum KeyKind {
    Bare,
    Reviver(ReviverFn),
    Options(KeyOptions),
}

impl fmt::Debug for KeyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KeyKind::Bare => f.write_str("Bare"),
            KeyKind::Reviver(_) => f.write_str("Reviver"),
            KeyKind::Options(options) => f.debug_tuple("Options").field(options).finish(),
        }
    }
}

impl CanonicalKey {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> &KeyKind {
        &self.kind
    }

    /// Options record, when this key carries one.
    pub fn options(&self) -> Option<&KeyOptions> {
        match &self.kind {
            KeyKind::Options(options) => Some(options),
            _ => None,
        }
    }

    /// Effective parse-time reviver: a bare function supplied as the key's
    /// value wins; otherwise the options record's `reviver` field.
    pub fn reviver(&self) -> Option<&ReviverFn> {
        match &self.kind {
            KeyKind::Reviver(f) => Some(f),
            KeyKind::Options(options) => options.reviver.as_ref(),
            KeyKind::Bare => None,
        }
    }

    /// Post-parse deserializer, options form only.
    pub fn deserializer(&self) -> Option<&DeserializeFn> {
        self.options().and_then(|options| options.deserialize.as_ref())
    }

    /// Resolve the encrypt/decrypt pair. Takes effect only when both halves
    /// are configured; a lone half disables the pair and reports a warning.
    pub fn cipher(&self, warn: &dyn WarnSink) -> Option<(&CipherFn, &CipherFn)> {
        let options = self.options()?;
        match (&options.encrypt, &options.decrypt) {
            (Some(encrypt), Some(decrypt)) => Some((encrypt, decrypt)),
            (None, None) => None,
            (half_encrypt, _) => {
                warn.warn(Warning::CipherPairIncomplete {
                    key: self.name.clone(),
                    present: if half_encrypt.is_some() { "encrypt" } else { "decrypt" },
                });
                None
            }
        }
    }
}

impl TryFrom<RawKey> for CanonicalKey {
    type Error = KeyError;

    fn try_from(raw: RawKey) -> Result<Self, Self::Error> {
        let (name, kind) = match raw {
            RawKey::Bare(name) => (name, KeyKind::Bare),
            RawKey::WithReviver(name, f) => (name, KeyKind::Reviver(f)),
            RawKey::WithOptions(name, options) => (name, KeyKind::Options(options)),
        };
        match name {
            Value::String(name) => Ok(CanonicalKey { name, kind }),
            other => Err(KeyError::InvalidName {
                kind: value_kind(&other),
            }),
        }
    }
}

/// Validate a raw key list into canonical form. Order and duplicates are
/// preserved; the output has exactly one entry per input. This is the only
/// setup-time validation: option shapes are fixed by their types, and the
/// cipher-pair check happens lazily with a warning rather than an error.
pub fn normalize(raw: Vec<RawKey>) -> Result<Vec<CanonicalKey>, KeyError> {
    raw.into_iter().map(CanonicalKey::try_from).collect()
}

/// Runtime type name of a JSON value, for validation messages.
pub fn value_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
