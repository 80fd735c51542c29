//! Structural binary codec
//!
//! Payloads are BSON documents. The BSON parser accepts any well-formed
//! document, so every decoded payload is additionally checked against a
//! [`Shape`] before it is turned into a typed value. The shape is built once
//! per message type, usually from a template value of that type.

use std::collections::BTreeMap;
use std::marker::PhantomData;

use bson::{Bson, Document, RawDocument};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::trace;

/// Codec errors. Only raised on the encoding side and while building shapes;
/// decoding reports failure as `None`.
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    #[error("failed to encode document: {0}")]
    Encode(#[from] bson::ser::Error),

    #[error("unsupported template value at `{0}`")]
    UnsupportedTemplate(String),
}

/// Structural schema of a message.
#[derive(Debug, Clone, PartialEq)]
pub enum Shape {
    Bool,
    /// Any BSON numeric (double, int32, int64)
    Number,
    String,
    /// Homogeneous array. `None` only accepts empty arrays.
    Array(Option<Box<Shape>>),
    Object(BTreeMap<String, Shape>),
}

impl Shape {
    /// Declare an array whose elements all match `element`
    pub fn array(element: Shape) -> Self {
        Self::Array(Some(Box::new(element)))
    }

    /// Declare an object from `(field, shape)` pairs
    pub fn object<I, K>(fields: I) -> Self
    where
        I: IntoIterator<Item = (K, Shape)>,
        K: Into<String>,
    {
        Self::Object(fields.into_iter().map(|(k, v)| (k.into(), v)).collect())
    }

    /// Build a shape from a template value.
    ///
    /// Arrays in the template describe their elements by their first entry.
    pub fn from_template<T: Serialize>(template: &T) -> Result<Self, CodecError> {
        let document = bson::to_document(template)?;
        Self::from_document(&document, "")
    }

    fn from_document(document: &Document, path: &str) -> Result<Self, CodecError> {
        let mut fields = BTreeMap::new();
        for (key, value) in document {
            let field_path = if path.is_empty() {
                key.clone()
            } else {
                format!("{path}.{key}")
            };
            fields.insert(key.clone(), Self::from_bson(value, &field_path)?);
        }
        Ok(Self::Object(fields))
    }

    fn from_bson(value: &Bson, path: &str) -> Result<Self, CodecError> {
        match value {
            Bson::Boolean(_) => Ok(Self::Bool),
            Bson::Double(_) | Bson::Int32(_) | Bson::Int64(_) => Ok(Self::Number),
            Bson::String(_) => Ok(Self::String),
            Bson::Array(items) => match items.first() {
                Some(first) => Ok(Self::array(Self::from_bson(first, &format!("{path}[0]"))?)),
                None => Ok(Self::Array(None)),
            },
            Bson::Document(document) => Self::from_document(document, path),
            _ => Err(CodecError::UnsupportedTemplate(path.to_string())),
        }
    }

    /// Check a decoded value against this shape
    pub fn validate(&self, value: &Bson) -> bool {
        match (self, value) {
            (Self::Bool, Bson::Boolean(_)) => true,
            (Self::Number, Bson::Double(_) | Bson::Int32(_) | Bson::Int64(_)) => true,
            (Self::String, Bson::String(_)) => true,
            (Self::Array(None), Bson::Array(items)) => items.is_empty(),
            (Self::Array(Some(element)), Bson::Array(items)) => {
                items.iter().all(|item| element.validate(item))
            }
            (Self::Object(_), Bson::Document(document)) => self.validate_document(document),
            _ => false,
        }
    }

    /// Check a document against this shape. Key sets must be identical.
    pub fn validate_document(&self, document: &Document) -> bool {
        let Self::Object(fields) = self else {
            return false;
        };

        if fields.len() != document.len() {
            return false;
        }

        document.iter().all(|(key, value)| {
            fields
                .get(key)
                .is_some_and(|shape| shape.validate(value))
        })
    }
}

/// Typed codec for one message type
#[derive(Debug, Clone)]
pub struct Codec<T> {
    shape: Shape,
    _marker: PhantomData<fn() -> T>,
}

impl<T> Codec<T>
where
    T: Serialize + DeserializeOwned,
{
    /// Build a codec whose shape is taken from `template`
    pub fn new(template: &T) -> Result<Self, CodecError> {
        Ok(Self::with_shape(Shape::from_template(template)?))
    }

    /// Build a codec from a declared shape
    pub fn with_shape(shape: Shape) -> Self {
        Self {
            shape,
            _marker: PhantomData,
        }
    }

    /// Encode `value`, leaving `padding` zeroed bytes in front of the
    /// document for a header to be written into later.
    pub fn encode(&self, value: &T, padding: usize) -> Result<Vec<u8>, CodecError> {
        let document = bson::to_document(value)?;
        let mut buffer = vec![0u8; padding];
        document.to_writer(&mut buffer)?;
        Ok(buffer)
    }

    /// Decode a payload that starts after `padding` bytes.
    ///
    /// Returns `None` for anything that is not exactly one well-formed
    /// document matching the shape.
    pub fn decode(&self, bytes: &[u8], padding: usize) -> Option<T> {
        let payload = bytes.get(padding..)?;

        let raw = match RawDocument::from_bytes(payload) {
            Ok(raw) => raw,
            Err(e) => {
                trace!(error = %e, "Rejected malformed document");
                return None;
            }
        };
        let document = Document::try_from(raw).ok()?;

        if !self.shape.validate_document(&document) {
            trace!("Rejected document with mismatched shape");
            return None;
        }

        bson::from_document(document).ok()
    }
}
