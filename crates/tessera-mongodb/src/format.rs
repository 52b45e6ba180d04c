//! Document formatting
//!
//! Applies per-field formatters and hashes `encrypted` fields. Formatting
//! assumes the fragment was sanitized first; an undeclared key is reported as
//! an error.

use bson::{Bson, Document as BsonDocument};
use sha2::{Digest, Sha256};
use tessera_common::{Result, TesseraError};

use crate::hooks::FieldHookMap;
use crate::schema::Schema;

/// One-way hash of a value's string form, as lower-case hex
pub fn hash_value(value: &Bson) -> String {
    let text = match value {
        Bson::String(s) => s.clone(),
        other => other.to_string(),
    };
    let digest = Sha256::digest(text.as_bytes());
    digest.iter().map(|byte| format!("{:02x}", byte)).collect()
}

/// Format a fragment: formatter first, then encryption, per field
///
/// The input is never modified; a formatted copy is returned.
///
/// # Errors
/// Returns a schema error for a key the schema does not declare, or whatever
/// a formatter returns
pub async fn format(schema: &Schema, hooks: &FieldHookMap, fragment: &BsonDocument) -> Result<BsonDocument> {
    let mut formatted = fragment.clone();

    for (key, value) in formatted.iter_mut() {
        let Some(descriptor) = schema.field(key) else {
            return Err(TesseraError::Schema(format!(
                "cannot format '{}': not a field of model '{}'",
                key, schema.model
            )));
        };

        if let Some(formatter) = hooks.get(key.as_str()).and_then(|h| h.format.as_ref()) {
            let current = std::mem::replace(value, Bson::Null);
            *value = formatter(current).await?;
        }

        if descriptor.encrypted {
            *value = Bson::String(hash_value(value));
        }
    }

    Ok(formatted)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hooks::FieldHooks;
    use crate::schema::FieldDescriptor;
    use bson::doc;

    fn schema() -> Schema {
        Schema::builder("User", "users")
            .field("name", FieldDescriptor::string())
            .field("email", FieldDescriptor::string())
            .field("password", FieldDescriptor::string().encrypted())
            .build()
            .unwrap()
    }

    fn hooks() -> FieldHookMap {
        let mut hooks = FieldHookMap::new();
        hooks.insert(
            "email".to_string(),
            FieldHooks::new().format(|v| match v {
                Bson::String(s) => Bson::String(s.to_lowercase()),
                other => other,
            }),
        );
        hooks.insert(
            "password".to_string(),
            FieldHooks::new().format(|v| match v {
                Bson::String(s) => Bson::String(s.trim().to_string()),
                other => other,
            }),
        );
        hooks
    }

    #[test]
    fn test_hash_is_sha256_hex() {
        assert_eq!(
            hash_value(&Bson::String("abc".into())),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
        assert_eq!(hash_value(&Bson::Int32(1)), hash_value(&Bson::String("1".into())));
    }

    #[tokio::test]
    async fn test_formats_and_encrypts() {
        let input = doc! { "name": "Ada", "email": "ADA@EXAMPLE.COM", "password": " abc " };
        let output = format(&schema(), &hooks(), &input).await.unwrap();

        assert_eq!(output.get_str("name").unwrap(), "Ada");
        assert_eq!(output.get_str("email").unwrap(), "ada@example.com");
        // trimmed by the formatter before hashing
        assert_eq!(
            output.get_str("password").unwrap(),
            hash_value(&Bson::String("abc".into()))
        );
        // caller's document is untouched
        assert_eq!(input.get_str("email").unwrap(), "ADA@EXAMPLE.COM");
    }

    #[tokio::test]
    async fn test_undeclared_key_is_an_error() {
        let input = doc! { "name": "Ada", "nickname": "A" };
        let err = format(&schema(), &FieldHookMap::new(), &input).await.unwrap_err();
        assert!(err.to_string().contains("nickname"));
    }

    #[tokio::test]
    async fn test_formatter_errors_propagate() {
        let mut hooks = FieldHookMap::new();
        hooks.insert(
            "name".to_string(),
            FieldHooks::new().format_async(|_| async {
                Err::<Bson, _>(TesseraError::Validation("formatter refused".to_string()))
            }),
        );
        let result = format(&schema(), &hooks, &doc! { "name": "Ada" }).await;
        assert!(matches!(result, Err(TesseraError::Validation(_))));
    }
}
