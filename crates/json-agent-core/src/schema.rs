//! JSON Schema loading and validation
//!
//! Wraps the `jsonschema` crate behind a small, deterministic contract:
//! - [`load_schema`] reads a schema document from disk
//! - [`validate`] checks a document against a schema and returns a
//!   [`ValidationOutcome`]
//! - [`SchemaValidator`] holds an optional schema for repeated validation
//! - [`SchemaStore`] resolves request-supplied schema paths, optionally
//!   caching compiled schemas by path and modification time
//!
//! A document that fails validation is *not* an error: it produces an
//! outcome with `is_valid == false`. Errors are reserved for problems with
//! the schema itself or with how the validator is used.

use jsonschema::JSONSchema;
use serde::Serialize;
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::{Arc, OnceLock, RwLock};
use std::time::SystemTime;

use crate::error::SchemaError;

/// Result of validating one document against one schema.
///
/// `error` is set if and only if `is_valid` is false.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ValidationOutcome {
    is_valid: bool,
    error: Option<String>,
    #[serde(skip)]
    path: Vec<String>,
}

impl ValidationOutcome {
    /// A passing outcome
    pub fn valid() -> Self {
        Self {
            is_valid: true,
            error: None,
            path: Vec::new(),
        }
    }

    /// A failing outcome for a validation error at `path`
    pub fn invalid(message: impl AsRef<str>, path: Vec<String>) -> Self {
        Self {
            is_valid: false,
            error: Some(format!(
                "Validation error: {} at path: {}",
                message.as_ref(),
                path.join("/")
            )),
            path,
        }
    }

    /// A failing outcome that is not tied to a location in the document
    pub(crate) fn rejected(error: impl Into<String>) -> Self {
        Self {
            is_valid: false,
            error: Some(error.into()),
            path: Vec::new(),
        }
    }

    pub fn is_valid(&self) -> bool {
        self.is_valid
    }

    /// The formatted error, present only when invalid
    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    /// Structural path of the offending node (empty for the root or when valid)
    pub fn path(&self) -> &[String] {
        &self.path
    }

    /// Consume the outcome, returning the error message if invalid
    pub fn into_error(self) -> Option<String> {
        self.error
    }
}

/// An immutable JSON Schema document.
///
/// The compiled form is built on first use and shared by every clone.
#[derive(Clone)]
pub struct Schema {
    document: Arc<Value>,
    source: Option<PathBuf>,
    compiled: Arc<OnceLock<Result<Arc<JSONSchema>, String>>>,
}

impl Schema {
    /// Wrap an in-memory schema document
    pub fn new(document: Value) -> Self {
        Self {
            document: Arc::new(document),
            source: None,
            compiled: Arc::new(OnceLock::new()),
        }
    }

    /// Load a schema from a file
    pub fn load(path: impl AsRef<Path>) -> Result<Self, SchemaError> {
        load_schema(path)
    }

    /// The raw schema document
    pub fn as_value(&self) -> &Value {
        &self.document
    }

    /// The file this schema was loaded from, if any
    pub fn source(&self) -> Option<&Path> {
        self.source.as_deref()
    }

    fn compiled(&self) -> Result<Arc<JSONSchema>, SchemaError> {
        self.compiled
            .get_or_init(|| {
                JSONSchema::compile(&self.document)
                    .map(Arc::new)
                    .map_err(|e| e.to_string())
            })
            .clone()
            .map_err(SchemaError::InvalidSchema)
    }
}

impl fmt::Debug for Schema {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Schema")
            .field("source", &self.source)
            .field("document", &self.document)
            .finish()
    }
}

/// Load a JSON Schema document from `path`.
///
/// Fails with [`SchemaError::NotFound`] if `path` is not a readable file and
/// with [`SchemaError::Malformed`] if its content is not JSON.
pub fn load_schema(path: impl AsRef<Path>) -> Result<Schema, SchemaError> {
    let path = path.as_ref();
    if !path.is_file() {
        return Err(SchemaError::NotFound(path.to_path_buf()));
    }

    let bytes = std::fs::read(path).map_err(|e| {
        tracing::debug!(path = %path.display(), error = %e, "Schema file unreadable");
        SchemaError::NotFound(path.to_path_buf())
    })?;

    let document: Value = serde_json::from_slice(&bytes).map_err(|e| SchemaError::Malformed {
        path: path.to_path_buf(),
        message: e.to_string(),
    })?;

    tracing::debug!(path = %path.display(), "Loaded schema");

    Ok(Schema {
        document: Arc::new(document),
        source: Some(path.to_path_buf()),
        compiled: Arc::new(OnceLock::new()),
    })
}

/// Validate `document` against `schema`.
///
/// Pure and deterministic: the first error in the validator's iteration
/// order is reported. Fails only if the schema itself is not a valid JSON
/// Schema.
pub fn validate(document: &Value, schema: &Schema) -> Result<ValidationOutcome, SchemaError> {
    let compiled = schema.compiled()?;

    let outcome = match compiled.validate(document) {
        Ok(()) => ValidationOutcome::valid(),
        Err(mut errors) => match errors.next() {
            Some(error) => {
                let path = pointer_segments(&error.instance_path.to_string());
                ValidationOutcome::invalid(error.to_string(), path)
            }
            None => ValidationOutcome::rejected("Validation error: unknown failure at path: "),
        },
    };

    Ok(outcome)
}

/// Split a JSON pointer (`/items/0/price`) into unescaped segments
fn pointer_segments(pointer: &str) -> Vec<String> {
    if pointer.is_empty() {
        return Vec::new();
    }

    pointer
        .strip_prefix('/')
        .unwrap_or(pointer)
        .split('/')
        .map(|segment| segment.replace("~1", "/").replace("~0", "~"))
        .collect()
}

/// Validator holding an optional schema.
///
/// Validating without a schema is a usage error ([`SchemaError::NoSchema`]),
/// never a silent pass.
#[derive(Debug, Clone, Default)]
pub struct SchemaValidator {
    schema: Option<Schema>,
}

impl SchemaValidator {
    /// Create a validator, optionally with a schema
    pub fn new(schema: Option<Schema>) -> Self {
        Self { schema }
    }

    /// Create a validator from a schema file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, SchemaError> {
        Ok(Self::new(Some(load_schema(path)?)))
    }

    /// Set or replace the schema
    pub fn set_schema(&mut self, schema: Schema) {
        self.schema = Some(schema);
    }

    pub fn schema(&self) -> Option<&Schema> {
        self.schema.as_ref()
    }

    /// Validate a JSON value against the configured schema
    pub fn validate_json(&self, document: &Value) -> Result<ValidationOutcome, SchemaError> {
        let schema = self.schema.as_ref().ok_or(SchemaError::NoSchema)?;
        validate(document, schema)
    }

    /// Validate a JSON file against the configured schema.
    ///
    /// Unreadable or unparsable files yield an invalid outcome rather than
    /// an error.
    pub fn validate_json_file(
        &self,
        path: impl AsRef<Path>,
    ) -> Result<ValidationOutcome, SchemaError> {
        if self.schema.is_none() {
            return Err(SchemaError::NoSchema);
        }

        let content = match std::fs::read_to_string(path.as_ref()) {
            Ok(content) => content,
            Err(e) => return Ok(ValidationOutcome::rejected(format!("Error reading file: {}", e))),
        };

        match serde_json::from_str::<Value>(&content) {
            Ok(document) => self.validate_json(&document),
            Err(e) => Ok(ValidationOutcome::rejected(format!("Invalid JSON: {}", e))),
        }
    }
}

/// Cached schema entry
struct CachedSchema {
    modified: Option<SystemTime>,
    schema: Schema,
}

/// Resolves schema paths supplied with requests.
///
/// Relative paths resolve against the store's root directory. With caching
/// enabled, a schema is re-read only when its modification time changes;
/// a missing file is reported as missing on every lookup.
pub struct SchemaStore {
    root: PathBuf,
    cache_enabled: bool,
    cache: RwLock<HashMap<PathBuf, CachedSchema>>,
}

impl SchemaStore {
    /// Create a store resolving relative paths against `root`
    pub fn new(root: impl Into<PathBuf>, cache_enabled: bool) -> Self {
        Self {
            root: root.into(),
            cache_enabled,
            cache: RwLock::new(HashMap::new()),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Resolve a request-supplied schema path
    pub fn resolve(&self, schema_path: impl AsRef<Path>) -> PathBuf {
        let schema_path = schema_path.as_ref();
        if schema_path.is_absolute() {
            schema_path.to_path_buf()
        } else {
            self.root.join(schema_path)
        }
    }

    /// Resolve and load a schema
    pub fn load(&self, schema_path: impl AsRef<Path>) -> Result<Schema, SchemaError> {
        let path = self.resolve(schema_path);

        let metadata = match std::fs::metadata(&path) {
            Ok(metadata) if metadata.is_file() => metadata,
            _ => {
                self.evict(&path);
                return Err(SchemaError::NotFound(path));
            }
        };

        if !self.cache_enabled {
            return load_schema(&path);
        }

        let modified = metadata.modified().ok();
        if let Ok(cache) = self.cache.read() {
            if let Some(entry) = cache.get(&path) {
                if entry.modified.is_some() && entry.modified == modified {
                    tracing::trace!(path = %path.display(), "Schema cache hit");
                    return Ok(entry.schema.clone());
                }
            }
        }

        let schema = load_schema(&path)?;
        if let Ok(mut cache) = self.cache.write() {
            cache.insert(
                path,
                CachedSchema {
                    modified,
                    schema: schema.clone(),
                },
            );
        }

        Ok(schema)
    }

    /// Number of cached schemas
    pub fn cached_len(&self) -> usize {
        self.cache.read().map(|c| c.len()).unwrap_or(0)
    }

    fn evict(&self, path: &Path) {
        if let Ok(mut cache) = self.cache.write() {
            cache.remove(path);
        }
    }
}

impl fmt::Debug for SchemaStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SchemaStore")
            .field("root", &self.root)
            .field("cache_enabled", &self.cache_enabled)
            .field("cached", &self.cached_len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use serde_json::json;
    use std::io::Write;

    fn required_id_schema() -> Schema {
        Schema::new(json!({"type": "object", "required": ["id"]}))
    }

    fn write_temp(content: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file
    }

    #[test]
    fn test_valid_document() {
        let outcome = validate(&json!({"id": 1}), &required_id_schema()).unwrap();
        assert!(outcome.is_valid());
        assert!(outcome.error().is_none());
    }

    #[test]
    fn test_missing_required_at_root() {
        let outcome = validate(&json!({"name": "x"}), &required_id_schema()).unwrap();
        assert!(!outcome.is_valid());
        assert!(outcome.path().is_empty());

        let error = outcome.error().unwrap();
        assert!(error.starts_with("Validation error: "));
        assert!(error.contains("id"));
        assert!(error.ends_with(" at path: "));
    }

    #[test]
    fn test_nested_path_is_slash_joined() {
        let schema = Schema::new(json!({
            "type": "object",
            "properties": {
                "items": {
                    "type": "array",
                    "items": {
                        "type": "object",
                        "properties": {"price": {"type": "number"}}
                    }
                }
            }
        }));

        let document = json!({"items": [{"price": 1.5}, {"price": "free"}]});
        let outcome = validate(&document, &schema).unwrap();

        assert!(!outcome.is_valid());
        assert_eq!(outcome.path(), ["items", "1", "price"]);
        assert!(outcome.error().unwrap().ends_with("at path: items/1/price"));
    }

    #[test]
    fn test_validation_does_not_mutate_inputs() {
        let schema = required_id_schema();
        let document = json!({"name": "x"});
        let before = (document.clone(), schema.as_value().clone());

        let _ = validate(&document, &schema).unwrap();

        assert_eq!(before.0, document);
        assert_eq!(&before.1, schema.as_value());
    }

    #[test]
    fn test_invalid_schema_is_an_error() {
        let schema = Schema::new(json!({"type": 12}));
        let result = validate(&json!({}), &schema);
        assert!(matches!(result, Err(SchemaError::InvalidSchema(_))));
    }

    #[test]
    fn test_validator_without_schema_fails_loudly() {
        let validator = SchemaValidator::default();
        assert!(matches!(
            validator.validate_json(&json!({})),
            Err(SchemaError::NoSchema)
        ));
    }

    #[test]
    fn test_load_schema_not_found() {
        let result = load_schema("/definitely/not/here/schema.json");
        assert!(matches!(result, Err(SchemaError::NotFound(_))));
    }

    #[test]
    fn test_load_schema_malformed() {
        let file = write_temp("{ not json");
        let result = load_schema(file.path());
        assert!(matches!(result, Err(SchemaError::Malformed { .. })));
    }

    #[test]
    fn test_load_schema_invalid_utf8_is_malformed() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(&[0x7b, 0xff, 0xfe, 0x7d]).unwrap();

        let result = load_schema(file.path());
        assert!(matches!(result, Err(SchemaError::Malformed { .. })));

        let err: crate::MutationError = result.unwrap_err().into();
        assert!(matches!(err, crate::MutationError::MalformedSchema { .. }));
    }

    #[test]
    fn test_load_schema_directory_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let result = load_schema(dir.path());
        assert!(matches!(result, Err(SchemaError::NotFound(_))));
    }

    #[test]
    fn test_load_schema_from_file() {
        let file = write_temp(r#"{"type": "object", "required": ["id"]}"#);
        let validator = SchemaValidator::from_file(file.path()).unwrap();

        assert_eq!(validator.schema().unwrap().source(), Some(file.path()));
        assert!(validator.validate_json(&json!({"id": 7})).unwrap().is_valid());
        assert!(!validator.validate_json(&json!({})).unwrap().is_valid());
    }

    #[test]
    fn test_validate_json_file() {
        let validator = SchemaValidator::new(Some(required_id_schema()));

        let good = write_temp(r#"{"id": "abc"}"#);
        assert!(validator.validate_json_file(good.path()).unwrap().is_valid());

        let broken = write_temp("{invalid");
        let outcome = validator.validate_json_file(broken.path()).unwrap();
        assert!(outcome.error().unwrap().starts_with("Invalid JSON: "));

        let outcome = validator
            .validate_json_file("/definitely/not/here.json")
            .unwrap();
        assert!(outcome.error().unwrap().starts_with("Error reading file: "));
    }

    #[test]
    fn test_pointer_segments() {
        assert!(pointer_segments("").is_empty());
        assert_eq!(pointer_segments("/a/0/b"), ["a", "0", "b"]);
        assert_eq!(pointer_segments("/a~1b/c~0d"), ["a/b", "c~d"]);
    }

    #[test]
    fn test_store_resolves_relative_paths() {
        let dir = tempfile::tempdir().unwrap();
        let store = SchemaStore::new(dir.path(), false);

        assert_eq!(store.resolve("deal.json"), dir.path().join("deal.json"));
        assert_eq!(store.resolve("/abs/deal.json"), PathBuf::from("/abs/deal.json"));
    }

    #[test]
    fn test_store_caches_and_reports_missing_files() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("schema.json");
        std::fs::write(&path, r#"{"required": ["id"]}"#).unwrap();

        let store = SchemaStore::new(dir.path(), true);
        let schema = store.load("schema.json").unwrap();
        assert_eq!(schema.as_value(), &json!({"required": ["id"]}));
        assert_eq!(store.cached_len(), 1);

        std::fs::remove_file(&path).unwrap();
        assert!(matches!(
            store.load("schema.json"),
            Err(SchemaError::NotFound(_))
        ));
        assert_eq!(store.cached_len(), 0);
    }

    proptest! {
        #[test]
        fn prop_error_present_iff_invalid(n in any::<i64>()) {
            let schema = Schema::new(json!({
                "type": "object",
                "properties": {"n": {"type": "integer", "minimum": 0}}
            }));
            let document = json!({"n": n});

            let outcome = validate(&document, &schema).unwrap();
            prop_assert_eq!(outcome.is_valid(), n >= 0);
            prop_assert_eq!(outcome.error().is_some(), !outcome.is_valid());
        }

        #[test]
        fn prop_validation_is_idempotent(n in any::<i64>(), label in "[a-z]{0,8}") {
            let schema = Schema::new(json!({
                "type": "object",
                "required": ["label"],
                "properties": {"n": {"maximum": 100}}
            }));
            let document = if label.is_empty() {
                json!({"n": n})
            } else {
                json!({"n": n, "label": label})
            };

            let first = validate(&document, &schema).unwrap();
            let second = validate(&document, &schema).unwrap();
            prop_assert_eq!(first, second);
        }
    }
}
