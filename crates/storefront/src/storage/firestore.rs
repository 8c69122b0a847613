//! Firestore REST client used as the remote document store.
//!
//! Documents live at `users/{userId}`. Reads use `GET` on the document and
//! treat `404` as "no document". Merge-writes use `PATCH` with an
//! `updateMask.fieldPaths` entry per written field, which creates the
//! document when it does not exist and leaves other fields alone.
//!
//! Firestore wraps every value in a typed envelope (`stringValue`,
//! `integerValue`, `mapValue`, ...). [`encode_fields`] and [`decode_fields`]
//! convert between those envelopes and plain JSON.

use reqwest::StatusCode;
use secrecy::{ExposeSecret, SecretString};
use serde_json::{Map, Value, json};
use tracing::instrument;
use url::Url;

use nogalim_core::UserId;

use super::{DocumentStore, StorageError, UserDocument};
use crate::config::FirestoreConfig;

/// Remote document store backed by Firestore.
#[derive(Clone)]
pub struct FirestoreStore {
    client: reqwest::Client,
    collection_url: String,
    api_key: Option<SecretString>,
}

impl std::fmt::Debug for FirestoreStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FirestoreStore")
            .field("collection_url", &self.collection_url)
            .field("api_key", &self.api_key.as_ref().map(|_| "[REDACTED]"))
            .finish_non_exhaustive()
    }
}

impl FirestoreStore {
    /// Create a client for the configured project.
    ///
    /// # Errors
    ///
    /// Returns error if the HTTP client fails to build.
    pub fn new(config: &FirestoreConfig) -> Result<Self, StorageError> {
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()?;

        let collection_url = format!(
            "{}/projects/{}/databases/(default)/documents/{}",
            config.base_url.trim_end_matches('/'),
            config.project_id,
            config.collection,
        );

        Ok(Self {
            client,
            collection_url,
            api_key: config.api_key.clone(),
        })
    }

    /// URL of a user's document with the given extra query parameters.
    fn document_url(&self, user: &UserId, params: &[(&str, &str)]) -> Result<Url, StorageError> {
        let base = format!(
            "{}/{}",
            self.collection_url,
            urlencoding::encode(user.as_str())
        );

        let mut query: Vec<(&str, &str)> = params.to_vec();
        if let Some(key) = &self.api_key {
            query.push(("key", key.expose_secret()));
        }

        Url::parse_with_params(&base, query)
            .map_err(|e| StorageError::InvalidDocument(format!("bad document URL: {e}")))
    }
}

impl DocumentStore for FirestoreStore {
    #[instrument(skip(self), fields(user = %user))]
    async fn fetch(&self, user: &UserId) -> Result<Option<UserDocument>, StorageError> {
        let url = self.document_url(user, &[])?;
        let response = self.client.get(url).send().await?;
        let status = response.status();

        if status == StatusCode::NOT_FOUND {
            tracing::debug!("No remote document");
            return Ok(None);
        }

        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(StorageError::Remote {
                status: status.as_u16(),
                message,
            });
        }

        let body: Value = response.json().await?;
        let fields = match body.get("fields") {
            Some(Value::Object(fields)) => decode_fields(&known_fields(fields))?,
            Some(other) => {
                return Err(StorageError::InvalidDocument(format!(
                    "fields is not an object: {other}"
                )));
            }
            None => Map::new(),
        };

        let document = serde_json::from_value(Value::Object(fields))?;
        Ok(Some(document))
    }

    #[instrument(skip(self, patch), fields(user = %user))]
    async fn merge_write(&self, user: &UserId, patch: UserDocument) -> Result<(), StorageError> {
        let field_names = patch.field_names();
        if field_names.is_empty() {
            return Ok(());
        }

        let params: Vec<(&str, &str)> = field_names
            .iter()
            .map(|name| ("updateMask.fieldPaths", *name))
            .collect();
        let url = self.document_url(user, &params)?;

        let Value::Object(plain) = serde_json::to_value(&patch)? else {
            return Err(StorageError::InvalidDocument(
                "document did not serialize to an object".to_string(),
            ));
        };
        let body = json!({ "fields": encode_fields(&plain) });

        let response = self.client.patch(url).json(&body).send().await?;
        let status = response.status();

        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(StorageError::Remote {
                status: status.as_u16(),
                message,
            });
        }

        tracing::debug!(fields = ?field_names, "Remote document updated");
        Ok(())
    }
}

// =============================================================================
// Value Codec
// =============================================================================

/// Encode a plain JSON object as Firestore document fields.
#[must_use]
pub fn encode_fields(fields: &Map<String, Value>) -> Value {
    Value::Object(
        fields
            .iter()
            .map(|(key, value)| (key.clone(), encode_value(value)))
            .collect(),
    )
}

/// Encode a plain JSON value as a Firestore typed value.
#[must_use]
pub fn encode_value(value: &Value) -> Value {
    match value {
        Value::Null => json!({ "nullValue": null }),
        Value::Bool(b) => json!({ "booleanValue": b }),
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                json!({ "integerValue": i.to_string() })
            } else if let Some(u) = n.as_u64() {
                json!({ "integerValue": u.to_string() })
            } else {
                json!({ "doubleValue": n.as_f64() })
            }
        }
        Value::String(s) => json!({ "stringValue": s }),
        Value::Array(values) => {
            let values: Vec<Value> = values.iter().map(encode_value).collect();
            json!({ "arrayValue": { "values": values } })
        }
        Value::Object(fields) => json!({ "mapValue": { "fields": encode_fields(fields) } }),
    }
}

/// Keep only the fields of a stored document the cart store reads.
///
/// Other fields belong to other writers and may use envelopes the codec does
/// not handle.
fn known_fields(fields: &Map<String, Value>) -> Map<String, Value> {
    fields
        .iter()
        .filter(|(key, _)| UserDocument::FIELDS.contains(&key.as_str()))
        .map(|(key, value)| (key.clone(), value.clone()))
        .collect()
}

/// Decode Firestore document fields into a plain JSON object.
///
/// # Errors
///
/// Returns [`StorageError::InvalidDocument`] if a value has an unknown or
/// malformed type envelope.
pub fn decode_fields(fields: &Map<String, Value>) -> Result<Map<String, Value>, StorageError> {
    fields
        .iter()
        .map(|(key, value)| Ok((key.clone(), decode_value(value)?)))
        .collect()
}

/// Decode a Firestore typed value into plain JSON.
///
/// # Errors
///
/// Returns [`StorageError::InvalidDocument`] if the envelope is unknown or
/// malformed.
pub fn decode_value(value: &Value) -> Result<Value, StorageError> {
    let Value::Object(envelope) = value else {
        return Err(invalid(value));
    };
    let Some((kind, inner)) = envelope.iter().next() else {
        return Err(invalid(value));
    };

    match (kind.as_str(), inner) {
        ("nullValue", _) => Ok(Value::Null),
        ("booleanValue", Value::Bool(b)) => Ok(Value::Bool(*b)),
        ("integerValue", Value::String(s)) => s
            .parse::<i64>()
            .map(Value::from)
            .map_err(|_| invalid(value)),
        ("integerValue" | "doubleValue", Value::Number(n)) => Ok(Value::Number(n.clone())),
        ("stringValue" | "timestampValue" | "referenceValue", Value::String(s)) => {
            Ok(Value::String(s.clone()))
        }
        ("arrayValue", Value::Object(array)) => match array.get("values") {
            Some(Value::Array(values)) => values
                .iter()
                .map(decode_value)
                .collect::<Result<Vec<_>, _>>()
                .map(Value::Array),
            None => Ok(Value::Array(Vec::new())),
            Some(_) => Err(invalid(value)),
        },
        ("mapValue", Value::Object(map)) => match map.get("fields") {
            Some(Value::Object(fields)) => decode_fields(fields).map(Value::Object),
            None => Ok(Value::Object(Map::new())),
            Some(_) => Err(invalid(value)),
        },
        ("geoPointValue", Value::Object(point)) => Ok(json!({
            "lat": point.get("latitude").cloned().unwrap_or(Value::from(0.0)),
            "lon": point.get("longitude").cloned().unwrap_or(Value::from(0.0)),
        })),
        _ => Err(invalid(value)),
    }
}

fn invalid(value: &Value) -> StorageError {
    StorageError::InvalidDocument(format!("unsupported Firestore value: {value}"))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use nogalim_core::{Cart, ItemId, Location, Price};

    use super::*;

    #[test]
    fn test_encode_cart_document() {
        let mut cart = Cart::new();
        let id = cart.add("Walnuts", Price::from_units(120), Some("w.png".into()));
        let Value::Object(plain) = serde_json::to_value(UserDocument::with_cart(cart)).unwrap()
        else {
            panic!("expected object");
        };

        let fields = encode_fields(&plain);
        let item = &fields["cart"]["arrayValue"]["values"][0]["mapValue"]["fields"];
        assert_eq!(item["name"], json!({ "stringValue": "Walnuts" }));
        assert_eq!(item["quantity"], json!({ "integerValue": "1" }));
        assert_eq!(item["price"], json!({ "doubleValue": 120.0 }));
        assert_eq!(
            item["id"],
            json!({ "integerValue": id.as_i64().to_string() })
        );
        assert!(fields.get("location").is_none());
    }

    #[test]
    fn test_decode_web_client_document() {
        let fields = json!({
            "cart": { "arrayValue": { "values": [
                { "mapValue": { "fields": {
                    "id": { "integerValue": "1700000000001" },
                    "name": { "stringValue": "Dates" },
                    "price": { "integerValue": "90" },
                    "quantity": { "integerValue": "2" }
                } } }
            ] } },
            "location": { "mapValue": { "fields": {
                "lat": { "doubleValue": 30.05 },
                "lon": { "doubleValue": 31.25 }
            } } },
            "displayName": { "stringValue": "Mona" }
        });

        let Value::Object(fields) = fields else {
            panic!("expected object");
        };
        let plain = decode_fields(&fields).unwrap();
        let doc: UserDocument = serde_json::from_value(Value::Object(plain)).unwrap();

        let cart = doc.cart.unwrap();
        let line = cart.get(ItemId::new(1_700_000_000_001)).unwrap();
        assert_eq!(line.name, "Dates");
        assert_eq!(line.price, Price::from_units(90));
        assert_eq!(line.quantity, 2);
        assert_eq!(doc.location, Some(Location::new(30.05, 31.25)));
    }

    #[test]
    fn test_decode_empty_array_and_map() {
        assert_eq!(decode_value(&json!({ "arrayValue": {} })).unwrap(), json!([]));
        assert_eq!(decode_value(&json!({ "mapValue": {} })).unwrap(), json!({}));
    }

    #[test]
    fn test_known_fields_drops_foreign_fields() {
        let Value::Object(fields) = json!({
            "cart": { "arrayValue": {} },
            "avatar": { "bytesValue": "AAE=" },
            "createdAt": { "timestampValue": "2024-01-01T00:00:00Z" }
        }) else {
            unreachable!()
        };

        let decoded = decode_fields(&known_fields(&fields)).unwrap();
        assert_eq!(Value::Object(decoded), json!({ "cart": [] }));
    }

    #[test]
    fn test_decode_rejects_unknown_envelope() {
        assert!(decode_value(&json!({ "bytesValue": "AAE=" })).is_err());
        assert!(decode_value(&json!({ "integerValue": "twelve" })).is_err());
        assert!(decode_value(&json!("bare")).is_err());
    }

    #[test]
    fn test_document_url_encodes_user_and_key() {
        let config = FirestoreConfig::for_project("nogalim-test")
            .with_api_key(SecretString::from("AIzaTestKey"));
        let store = FirestoreStore::new(&config).unwrap();
        let uid = UserId::parse("auth0|abc").unwrap();

        let url = store
            .document_url(&uid, &[("updateMask.fieldPaths", "cart")])
            .unwrap();
        let url = url.as_str();
        assert!(url.starts_with(
            "https://firestore.googleapis.com/v1/projects/nogalim-test/databases/(default)/documents/users/auth0%7Cabc?"
        ));
        assert!(url.contains("updateMask.fieldPaths=cart"));
        assert!(url.contains("key=AIzaTestKey"));
    }
}
