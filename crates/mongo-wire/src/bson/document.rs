//! Ordered BSON documents and arrays

use crate::bson::{RawArray, RawDocument, Value};
use crate::error::{Result, WireError};

/// An ordered sequence of uniquely named fields.
///
/// Field order is insertion order and is significant: encoding emits fields
/// in exactly this order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Document {
    fields: Vec<(String, Value)>,
}

impl Document {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            fields: Vec::with_capacity(capacity),
        }
    }

    /// Appends a field, rejecting duplicate names and names containing NUL
    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<Value>) -> Result<()> {
        let name = name.into();
        if name.contains('\0') {
            return Err(WireError::NulInName(name));
        }
        if self.contains(&name) {
            return Err(WireError::DuplicateField(name));
        }
        self.fields.push((name, value.into()));
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.fields
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.fields.iter().any(|(n, _)| n == name)
    }

    /// The name of the first field, conventionally the command name
    pub fn command(&self) -> Option<&str> {
        self.fields.first().map(|(n, _)| n.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.fields.iter().map(|(n, v)| (n.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Serialises the document into its binary form
    pub fn encode(&self) -> Result<RawDocument> {
        crate::bson::encode::encode_document(self).map(RawDocument::from_vec)
    }
}

/// An ordered sequence of values.
///
/// On the wire an array is a document whose field names are the decimal
/// encodings of the positional indices, starting at "0".
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Array {
    values: Vec<Value>,
}

impl Array {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, value: impl Into<Value>) {
        self.values.push(value.into());
    }

    pub fn get(&self, index: usize) -> Option<&Value> {
        self.values.get(index)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Value> {
        self.values.iter()
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn encode(&self) -> Result<RawArray> {
        crate::bson::encode::encode_array(self).map(RawArray::from_vec)
    }
}

impl FromIterator<Value> for Array {
    fn from_iter<T: IntoIterator<Item = Value>>(iter: T) -> Self {
        Self {
            values: iter.into_iter().collect(),
        }
    }
}

/// Builds a [`Document`] from `name => value` pairs.
///
/// Panics on duplicate names or names containing NUL; both indicate builder
/// misuse rather than bad input.
#[macro_export]
macro_rules! doc {
    () => { $crate::Document::new() };
    ($($name:expr => $value:expr),+ $(,)?) => {{
        let mut document = $crate::Document::new();
        $(
            document
                .insert($name, $value)
                .expect("invalid document field");
        )+
        document
    }};
}

/// Builds an [`Array`] from values
#[macro_export]
macro_rules! array {
    () => { $crate::Array::new() };
    ($($value:expr),+ $(,)?) => {{
        let mut array = $crate::Array::new();
        $(
            array.push($value);
        )+
        array
    }};
}
