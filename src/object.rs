//! PDF object types.
//!
//! Objects are plain values. Indirect objects are never inlined: containers
//! hold [`Object::Reference`] keys that a [`Document`](crate::document::Document)
//! resolves on demand, which keeps cyclic graphs (`/Parent` back-links)
//! representable without shared ownership.

use crate::decoders::{DecodeParams, FilterStep};
use crate::error::{Error, Result};
use crate::parser_config::ParserOptions;
use serde::Serialize;
use std::collections::HashMap;

/// Dictionary payload: name (without the leading slash) to value.
pub type Dictionary = HashMap<String, Object>;

/// PDF object representation.
#[derive(Debug, Clone, PartialEq)]
pub enum Object {
    /// Null object
    Null,
    /// Boolean value
    Boolean(bool),
    /// Integer value
    Integer(i64),
    /// Real (floating-point) value
    Real(f64),
    /// String (byte array)
    String(Vec<u8>),
    /// Name (starting with /)
    Name(String),
    /// Array of objects
    Array(Vec<Object>),
    /// Dictionary (key-value pairs)
    Dictionary(Dictionary),
    /// Stream (dictionary + data)
    Stream {
        /// Stream dictionary
        dict: Dictionary,
        /// Raw stream bytes, still encoded with the stream's filters
        data: bytes::Bytes,
    },
    /// Indirect object reference
    Reference(ObjectRef),
}

/// Reference to an indirect object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct ObjectRef {
    /// Object number
    pub id: u32,
    /// Generation number
    pub gen: u16,
}

impl ObjectRef {
    /// Create a new object reference.
    pub fn new(id: u32, gen: u16) -> Self {
        Self { id, gen }
    }
}

impl std::fmt::Display for ObjectRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {} R", self.id, self.gen)
    }
}

impl Object {
    /// Get the type name of this object (without data).
    pub fn type_name(&self) -> &'static str {
        match self {
            Object::Null => "Null",
            Object::Boolean(_) => "Boolean",
            Object::Integer(_) => "Integer",
            Object::Real(_) => "Real",
            Object::String(_) => "String",
            Object::Name(_) => "Name",
            Object::Array(_) => "Array",
            Object::Dictionary(_) => "Dictionary",
            Object::Stream { .. } => "Stream",
            Object::Reference(_) => "Reference",
        }
    }

    /// Shorthand for a name object.
    pub fn name(name: &str) -> Self {
        Object::Name(name.to_string())
    }

    /// Try to cast to integer.
    pub fn as_integer(&self) -> Option<i64> {
        match self {
            Object::Integer(i) => Some(*i),
            _ => None,
        }
    }

    /// Numeric value of an integer or real.
    pub fn as_number(&self) -> Option<f64> {
        match self {
            Object::Integer(i) => Some(*i as f64),
            Object::Real(r) => Some(*r),
            _ => None,
        }
    }

    /// Try to cast to name.
    pub fn as_name(&self) -> Option<&str> {
        match self {
            Object::Name(s) => Some(s),
            _ => None,
        }
    }

    /// Try to cast to dictionary. Works for both Dictionary and Stream objects.
    pub fn as_dict(&self) -> Option<&Dictionary> {
        match self {
            Object::Dictionary(d) => Some(d),
            Object::Stream { dict, .. } => Some(dict),
            _ => None,
        }
    }

    /// Mutable counterpart of [`Object::as_dict`].
    pub fn as_dict_mut(&mut self) -> Option<&mut Dictionary> {
        match self {
            Object::Dictionary(d) => Some(d),
            Object::Stream { dict, .. } => Some(dict),
            _ => None,
        }
    }

    /// Try to cast to array.
    pub fn as_array(&self) -> Option<&Vec<Object>> {
        match self {
            Object::Array(arr) => Some(arr),
            _ => None,
        }
    }

    /// Try to cast to reference.
    pub fn as_reference(&self) -> Option<ObjectRef> {
        match self {
            Object::Reference(r) => Some(*r),
            _ => None,
        }
    }

    /// Try to cast to boolean.
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Object::Boolean(b) => Some(*b),
            _ => None,
        }
    }

    /// Try to cast to real number.
    pub fn as_real(&self) -> Option<f64> {
        match self {
            Object::Real(r) => Some(*r),
            _ => None,
        }
    }

    /// Try to cast to string (bytes).
    pub fn as_string(&self) -> Option<&[u8]> {
        match self {
            Object::String(s) => Some(s),
            _ => None,
        }
    }

    /// Check if object is null.
    pub fn is_null(&self) -> bool {
        matches!(self, Object::Null)
    }

    /// `/Type` name of a dictionary or stream, if any.
    pub fn dict_type(&self) -> Option<&str> {
        self.as_dict()?.get("Type").and_then(|t| t.as_name())
    }

    /// Collect every reference held directly or nested inside this object.
    ///
    /// References are appended in document order. Referenced objects are not
    /// followed.
    pub fn collect_references(&self, out: &mut Vec<ObjectRef>) {
        let mut pending: Vec<&Object> = vec![self];
        while let Some(obj) = pending.pop() {
            match obj {
                Object::Reference(r) => out.push(*r),
                Object::Array(items) => pending.extend(items.iter().rev()),
                Object::Dictionary(dict) | Object::Stream { dict, .. } => {
                    let mut keys: Vec<&String> = dict.keys().collect();
                    keys.sort();
                    for key in keys.into_iter().rev() {
                        pending.push(&dict[key]);
                    }
                },
                _ => {},
            }
        }
    }

    /// Rebuild this object with every nested reference replaced by `f(ref)`.
    pub fn map_references<F>(&self, f: &mut F) -> Object
    where
        F: FnMut(ObjectRef) -> Object,
    {
        match self {
            Object::Reference(r) => f(*r),
            Object::Array(items) => Object::Array(items.iter().map(|o| o.map_references(f)).collect()),
            Object::Dictionary(dict) => Object::Dictionary(map_dict_references(dict, f)),
            Object::Stream { dict, data } => Object::Stream {
                dict: map_dict_references(dict, f),
                data: data.clone(),
            },
            other => other.clone(),
        }
    }

    /// Decode stream data using the filters named in the stream dictionary.
    ///
    /// The stream bytes are expected to be plaintext already; decryption
    /// happens when the owning object is loaded.
    pub fn decode_stream_data(&self, options: &ParserOptions) -> Result<Vec<u8>> {
        match self {
            Object::Stream { dict, data } => {
                let steps = filter_chain(dict);
                if steps.is_empty() {
                    return Ok(data.to_vec());
                }
                crate::decoders::decode_stream(data, &steps, options)
            },
            _ => Err(Error::InvalidObjectType {
                expected: "Stream".to_string(),
                found: self.type_name().to_string(),
            }),
        }
    }
}

fn map_dict_references<F>(dict: &Dictionary, f: &mut F) -> Dictionary
where
    F: FnMut(ObjectRef) -> Object,
{
    // Deterministic order so the callback sees references the same way every run.
    let mut keys: Vec<&String> = dict.keys().collect();
    keys.sort();
    keys.into_iter()
        .map(|key| (key.clone(), dict[key].map_references(f)))
        .collect()
}

/// Build the filter pipeline of a stream dictionary.
///
/// `/Filter` is a name or an array of names; `/DecodeParms` is a dictionary
/// or an array aligned with the filters (entries may be null).
pub fn filter_chain(dict: &Dictionary) -> Vec<FilterStep> {
    let names = dict.get("Filter").map(extract_filter_names).unwrap_or_default();
    let params: Vec<Option<DecodeParams>> = match dict.get("DecodeParms") {
        Some(Object::Array(arr)) => arr.iter().map(extract_decode_params).collect(),
        Some(obj) => vec![extract_decode_params(obj)],
        None => Vec::new(),
    };

    names
        .into_iter()
        .enumerate()
        .map(|(i, name)| FilterStep {
            name,
            params: params.get(i).cloned().flatten(),
        })
        .collect()
}

/// Extract filter names from a Filter object.
fn extract_filter_names(filter_obj: &Object) -> Vec<String> {
    match filter_obj {
        Object::Name(name) => vec![name.clone()],
        Object::Array(arr) => arr
            .iter()
            .filter_map(|obj| obj.as_name().map(|s| s.to_string()))
            .collect(),
        _ => vec![],
    }
}

/// Extract predictor and LZW parameters from one DecodeParms dictionary.
fn extract_decode_params(params_obj: &Object) -> Option<DecodeParams> {
    let dict = params_obj.as_dict()?;
    let int = |key: &str, default: i64| dict.get(key).and_then(|o| o.as_integer()).unwrap_or(default);

    Some(DecodeParams {
        predictor: int("Predictor", 1),
        columns: int("Columns", 1).max(1) as usize,
        colors: int("Colors", 1).max(1) as usize,
        bits_per_component: int("BitsPerComponent", 8).max(1) as usize,
        early_change: int("EarlyChange", 1) != 0,
    })
}
