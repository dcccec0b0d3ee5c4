//! Field encoding pipeline.
//!
//! Encoders are bidirectional per-field transforms applied to attributes
//! before they reach storage, to filters before they reach a query, and to
//! rows coming back from storage. A field without an encoder is left as is.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use common::{AppError, AppResult};
use domain::{split_filter_key, Attributes, Filters};
use serde_json::Value;

/// Bidirectional value transform for one field.
pub trait Encoder: Send + Sync {
    /// Application value -> stored value
    fn encode(&self, value: &Value) -> Value;

    /// Stored value -> application value
    fn decode(&self, stored: &Value) -> Value;
}

/// Encoder built from a pair of closures.
pub struct FnEncoder<E, D> {
    encode: E,
    decode: D,
}

impl<E, D> FnEncoder<E, D>
where
    E: Fn(&Value) -> Value + Send + Sync,
    D: Fn(&Value) -> Value + Send + Sync,
{
    pub fn new(encode: E, decode: D) -> Self {
        Self { encode, decode }
    }
}

impl<E, D> Encoder for FnEncoder<E, D>
where
    E: Fn(&Value) -> Value + Send + Sync,
    D: Fn(&Value) -> Value + Send + Sync,
{
    fn encode(&self, value: &Value) -> Value {
        (self.encode)(value)
    }

    fn decode(&self, stored: &Value) -> Value {
        (self.decode)(stored)
    }
}

/// Stores any value as its JSON text.
///
/// Useful for backends that keep structured fields in text columns.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonTextEncoder;

impl Encoder for JsonTextEncoder {
    fn encode(&self, value: &Value) -> Value {
        Value::String(value.to_string())
    }

    fn decode(&self, stored: &Value) -> Value {
        match stored {
            Value::String(text) => serde_json::from_str(text).unwrap_or_else(|_| stored.clone()),
            other => other.clone(),
        }
    }
}

/// Query backend capabilities needed to encode filters.
pub trait Filtering: Send + Sync {
    /// Whether `operator` (as in `field__operator`) takes a list of values.
    fn expects_array(&self, operator: &str) -> bool;
}

/// Encoders registered for a repository, keyed by field name.
#[derive(Clone, Default)]
pub struct EncoderSet {
    encoders: HashMap<String, Arc<dyn Encoder>>,
}

impl fmt::Debug for EncoderSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut fields: Vec<&String> = self.encoders.keys().collect();
        fields.sort();
        f.debug_struct("EncoderSet").field("fields", &fields).finish()
    }
}

impl EncoderSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register (or replace) the encoder of a field.
    pub fn register(&mut self, field: impl Into<String>, encoder: Arc<dyn Encoder>) {
        self.encoders.insert(field.into(), encoder);
    }

    pub fn get(&self, field: &str) -> Option<&Arc<dyn Encoder>> {
        self.encoders.get(field)
    }

    pub fn is_empty(&self) -> bool {
        self.encoders.is_empty()
    }

    pub fn encode(&self, attributes: &Attributes) -> Attributes {
        self.transform(attributes, |encoder, value| encoder.encode(value))
    }

    pub fn decode(&self, attributes: &Attributes) -> Attributes {
        self.transform(attributes, |encoder, value| encoder.decode(value))
    }

    pub fn encode_many(&self, rows: &[Attributes]) -> Vec<Attributes> {
        rows.iter().map(|row| self.encode(row)).collect()
    }

    pub fn decode_many(&self, rows: &[Attributes]) -> Vec<Attributes> {
        rows.iter().map(|row| self.decode(row)).collect()
    }

    /// Encode filter values, selecting the encoder by the field part of
    /// `field__operator` keys.
    ///
    /// List operators get each element encoded; the filtering backend is
    /// only consulted for encoded fields that carry an operator.
    pub fn encode_filters(
        &self,
        filters: &Filters,
        filtering: Option<&dyn Filtering>,
    ) -> AppResult<Filters> {
        if self.is_empty() {
            return Ok(filters.clone());
        }

        let mut encoded = Filters::new();

        for (key, value) in filters {
            let (field, operator) = split_filter_key(key);

            let value = match (self.encoders.get(field), operator) {
                (None, _) => value.clone(),
                (Some(encoder), None) => encoder.encode(value),
                (Some(encoder), Some(operator)) => {
                    let filtering = filtering.ok_or(AppError::Unimplemented("filtering"))?;

                    match value {
                        Value::Array(items) if filtering.expects_array(operator) => {
                            Value::Array(items.iter().map(|item| encoder.encode(item)).collect())
                        }
                        _ => encoder.encode(value),
                    }
                }
            };

            encoded.insert(key.clone(), value);
        }

        Ok(encoded)
    }

    fn transform<F>(&self, attributes: &Attributes, apply: F) -> Attributes
    where
        F: Fn(&dyn Encoder, &Value) -> Value,
    {
        if self.is_empty() {
            return attributes.clone();
        }

        attributes
            .iter()
            .map(|(key, value)| {
                let value = match self.encoders.get(key) {
                    Some(encoder) => apply(encoder.as_ref(), value),
                    None => value.clone(),
                };
                (key.clone(), value)
            })
            .collect()
    }
}
