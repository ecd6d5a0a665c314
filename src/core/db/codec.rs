/// Row Codec Module
///
/// Serde glue between record types and SQLite values. Serializing a record
/// yields one bindable value per field; deserializing reads a `Row` back.
/// The two directions agree on every storage choice:
///
/// - `bool` binds as 0/1 and reads back from any integer
/// - `Vec<u8>` binds as a BLOB
/// - other sequences, maps, nested structs and data-carrying enum variants
///   bind as JSON text and are parsed back from it
/// - unit enum variants bind as their name

use crate::core::db::query::Row;
use crate::core::{RecdbError, Result};
use rusqlite::types::Value;
use serde::de::value::{Error as CodecError, MapDeserializer, SeqDeserializer, StrDeserializer};
use serde::de::{self, DeserializeOwned, IntoDeserializer, Visitor};
use serde::ser::{self, Serialize};

type CodecResult<T> = std::result::Result<T, CodecError>;

/// Hydrates a record from a row. Columns are matched to fields by name.
///
/// # Errors
///
/// `RecdbError::Attribute` when a column has no matching field (for types
/// that deny unknown fields), a field has no column, or a value does not
/// fit the field's type.
pub fn from_row<T: DeserializeOwned>(row: &Row) -> Result<T> {
    T::deserialize(RowDeserializer { row }).map_err(|e| RecdbError::Attribute(e.to_string()))
}

/// Serializes a record into `(field, value)` pairs, in field order.
///
/// # Errors
///
/// `RecdbError::Attribute` when the record is not a struct or map, or a
/// value cannot be represented in SQLite.
pub fn to_params<T: Serialize + ?Sized>(record: &T) -> Result<Vec<(String, Value)>> {
    match record.serialize(Encoder { top: true }) {
        Ok(Encoded::Fields(fields)) => Ok(fields),
        Ok(_) => Err(RecdbError::Attribute(
            "record does not serialize to a mapping".to_string(),
        )),
        Err(e) => Err(RecdbError::Attribute(e.to_string())),
    }
}

fn codec_error(e: impl std::fmt::Display) -> CodecError {
    de::Error::custom(e)
}

struct RowDeserializer<'de> {
    row: &'de Row,
}

impl<'de> de::Deserializer<'de> for RowDeserializer<'de> {
    type Error = CodecError;

    fn deserialize_any<V: Visitor<'de>>(self, visitor: V) -> CodecResult<V::Value> {
        let fields = self
            .row
            .iter()
            .map(|(column, value)| (column, ValueDeserializer { value }));
        let mut map = MapDeserializer::<_, CodecError>::new(fields);
        let record = visitor.visit_map(&mut map)?;
        map.end()?;
        Ok(record)
    }

    serde::forward_to_deserialize_any! {
        bool i8 i16 i32 i64 i128 u8 u16 u32 u64 u128 f32 f64 char str string
        bytes byte_buf option unit unit_struct newtype_struct seq tuple
        tuple_struct map struct enum identifier ignored_any
    }
}

struct ValueDeserializer<'de> {
    value: &'de Value,
}

impl<'de> IntoDeserializer<'de, CodecError> for ValueDeserializer<'de> {
    type Deserializer = Self;

    fn into_deserializer(self) -> Self {
        self
    }
}

impl<'de> de::Deserializer<'de> for ValueDeserializer<'de> {
    type Error = CodecError;

    fn deserialize_any<V: Visitor<'de>>(self, visitor: V) -> CodecResult<V::Value> {
        match self.value {
            Value::Null => visitor.visit_unit(),
            Value::Integer(i) => visitor.visit_i64(*i),
            Value::Real(f) => visitor.visit_f64(*f),
            Value::Text(t) => visitor.visit_borrowed_str(t),
            Value::Blob(b) => visitor.visit_borrowed_bytes(b),
        }
    }

    fn deserialize_bool<V: Visitor<'de>>(self, visitor: V) -> CodecResult<V::Value> {
        match self.value {
            Value::Integer(i) => visitor.visit_bool(*i != 0),
            _ => self.deserialize_any(visitor),
        }
    }

    fn deserialize_option<V: Visitor<'de>>(self, visitor: V) -> CodecResult<V::Value> {
        match self.value {
            Value::Null => visitor.visit_none(),
            _ => visitor.visit_some(self),
        }
    }

    fn deserialize_unit<V: Visitor<'de>>(self, visitor: V) -> CodecResult<V::Value> {
        match self.value {
            Value::Null => visitor.visit_unit(),
            _ => self.deserialize_any(visitor),
        }
    }

    fn deserialize_newtype_struct<V: Visitor<'de>>(
        self,
        _name: &'static str,
        visitor: V,
    ) -> CodecResult<V::Value> {
        visitor.visit_newtype_struct(self)
    }

    fn deserialize_seq<V: Visitor<'de>>(self, visitor: V) -> CodecResult<V::Value> {
        match self.value {
            Value::Text(t) => {
                let mut json = serde_json::Deserializer::from_str(t);
                let value = de::Deserializer::deserialize_seq(&mut json, visitor).map_err(codec_error)?;
                json.end().map_err(codec_error)?;
                Ok(value)
            }
            Value::Blob(b) => {
                let mut seq = SeqDeserializer::<_, CodecError>::new(b.iter().copied());
                let value = visitor.visit_seq(&mut seq)?;
                seq.end()?;
                Ok(value)
            }
            _ => self.deserialize_any(visitor),
        }
    }

    fn deserialize_tuple<V: Visitor<'de>>(self, _len: usize, visitor: V) -> CodecResult<V::Value> {
        self.deserialize_seq(visitor)
    }

    fn deserialize_tuple_struct<V: Visitor<'de>>(
        self,
        _name: &'static str,
        _len: usize,
        visitor: V,
    ) -> CodecResult<V::Value> {
        self.deserialize_seq(visitor)
    }

    fn deserialize_map<V: Visitor<'de>>(self, visitor: V) -> CodecResult<V::Value> {
        match self.value {
            Value::Text(t) => {
                let mut json = serde_json::Deserializer::from_str(t);
                let value = de::Deserializer::deserialize_map(&mut json, visitor).map_err(codec_error)?;
                json.end().map_err(codec_error)?;
                Ok(value)
            }
            _ => self.deserialize_any(visitor),
        }
    }

    fn deserialize_struct<V: Visitor<'de>>(
        self,
        name: &'static str,
        fields: &'static [&'static str],
        visitor: V,
    ) -> CodecResult<V::Value> {
        match self.value {
            Value::Text(t) => {
                let mut json = serde_json::Deserializer::from_str(t);
                let value = de::Deserializer::deserialize_struct(&mut json, name, fields, visitor)
                    .map_err(codec_error)?;
                json.end().map_err(codec_error)?;
                Ok(value)
            }
            _ => self.deserialize_any(visitor),
        }
    }

    fn deserialize_enum<V: Visitor<'de>>(
        self,
        name: &'static str,
        variants: &'static [&'static str],
        visitor: V,
    ) -> CodecResult<V::Value> {
        match self.value {
            Value::Text(t) if t.trim_start().starts_with('{') => {
                let mut json = serde_json::Deserializer::from_str(t);
                let value = de::Deserializer::deserialize_enum(&mut json, name, variants, visitor)
                    .map_err(codec_error)?;
                json.end().map_err(codec_error)?;
                Ok(value)
            }
            Value::Text(t) => {
                let variant: StrDeserializer<CodecError> = t.as_str().into_deserializer();
                visitor.visit_enum(variant)
            }
            _ => self.deserialize_any(visitor),
        }
    }

    serde::forward_to_deserialize_any! {
        i8 i16 i32 i64 i128 u8 u16 u32 u64 u128 f32 f64 char str string
        bytes byte_buf unit_struct identifier ignored_any
    }
}

/// Output of [`Encoder`]. `Byte` is kept apart from other integers so a
/// sequence made only of `u8` can bind as a BLOB.
enum Encoded {
    Value(Value),
    Byte(u8),
    Fields(Vec<(String, Value)>),
}

impl Encoded {
    fn into_value(self) -> CodecResult<Value> {
        match self {
            Encoded::Value(value) => Ok(value),
            Encoded::Byte(b) => Ok(Value::Integer(i64::from(b))),
            Encoded::Fields(_) => Err(codec_error("nested record escaped JSON encoding")),
        }
    }
}

fn json_text<T: Serialize + ?Sized>(value: &T) -> CodecResult<Encoded> {
    serde_json::to_string(value)
        .map(|text| Encoded::Value(Value::Text(text)))
        .map_err(codec_error)
}

/// Serializer for a record (`top`) or for one of its field values.
#[derive(Clone, Copy)]
struct Encoder {
    top: bool,
}

impl Encoder {
    fn field() -> Self {
        Encoder { top: false }
    }
}

type JsonSerializer = serde_json::value::Serializer;

impl ser::Serializer for Encoder {
    type Ok = Encoded;
    type Error = CodecError;
    type SerializeSeq = SeqEncoder;
    type SerializeTuple = SeqEncoder;
    type SerializeTupleStruct = SeqEncoder;
    type SerializeTupleVariant = JsonCompound<<JsonSerializer as ser::Serializer>::SerializeTupleVariant>;
    type SerializeMap = MapEncoder;
    type SerializeStruct = MapEncoder;
    type SerializeStructVariant = JsonCompound<<JsonSerializer as ser::Serializer>::SerializeStructVariant>;

    fn serialize_bool(self, v: bool) -> CodecResult<Encoded> {
        Ok(Encoded::Value(Value::Integer(i64::from(v))))
    }

    fn serialize_i8(self, v: i8) -> CodecResult<Encoded> {
        self.serialize_i64(i64::from(v))
    }

    fn serialize_i16(self, v: i16) -> CodecResult<Encoded> {
        self.serialize_i64(i64::from(v))
    }

    fn serialize_i32(self, v: i32) -> CodecResult<Encoded> {
        self.serialize_i64(i64::from(v))
    }

    fn serialize_i64(self, v: i64) -> CodecResult<Encoded> {
        Ok(Encoded::Value(Value::Integer(v)))
    }

    fn serialize_u8(self, v: u8) -> CodecResult<Encoded> {
        Ok(Encoded::Byte(v))
    }

    fn serialize_u16(self, v: u16) -> CodecResult<Encoded> {
        self.serialize_i64(i64::from(v))
    }

    fn serialize_u32(self, v: u32) -> CodecResult<Encoded> {
        self.serialize_i64(i64::from(v))
    }

    fn serialize_u64(self, v: u64) -> CodecResult<Encoded> {
        i64::try_from(v)
            .map(|i| Encoded::Value(Value::Integer(i)))
            .map_err(|_| codec_error(format!("{} does not fit a SQLite integer", v)))
    }

    fn serialize_f32(self, v: f32) -> CodecResult<Encoded> {
        self.serialize_f64(f64::from(v))
    }

    fn serialize_f64(self, v: f64) -> CodecResult<Encoded> {
        Ok(Encoded::Value(Value::Real(v)))
    }

    fn serialize_char(self, v: char) -> CodecResult<Encoded> {
        Ok(Encoded::Value(Value::Text(v.to_string())))
    }

    fn serialize_str(self, v: &str) -> CodecResult<Encoded> {
        Ok(Encoded::Value(Value::Text(v.to_string())))
    }

    fn serialize_bytes(self, v: &[u8]) -> CodecResult<Encoded> {
        Ok(Encoded::Value(Value::Blob(v.to_vec())))
    }

    fn serialize_none(self) -> CodecResult<Encoded> {
        Ok(Encoded::Value(Value::Null))
    }

    fn serialize_some<T: Serialize + ?Sized>(self, value: &T) -> CodecResult<Encoded> {
        value.serialize(self)
    }

    fn serialize_unit(self) -> CodecResult<Encoded> {
        Ok(Encoded::Value(Value::Null))
    }

    fn serialize_unit_struct(self, _name: &'static str) -> CodecResult<Encoded> {
        self.serialize_unit()
    }

    fn serialize_unit_variant(
        self,
        _name: &'static str,
        _index: u32,
        variant: &'static str,
    ) -> CodecResult<Encoded> {
        self.serialize_str(variant)
    }

    fn serialize_newtype_struct<T: Serialize + ?Sized>(
        self,
        _name: &'static str,
        value: &T,
    ) -> CodecResult<Encoded> {
        value.serialize(self)
    }

    fn serialize_newtype_variant<T: Serialize + ?Sized>(
        self,
        name: &'static str,
        index: u32,
        variant: &'static str,
        value: &T,
    ) -> CodecResult<Encoded> {
        let json = ser::Serializer::serialize_newtype_variant(serde_json::value::Serializer, name, index, variant, value)
            .map_err(codec_error)?;
        json_text(&json)
    }

    fn serialize_seq(self, len: Option<usize>) -> CodecResult<SeqEncoder> {
        Ok(SeqEncoder {
            json: Vec::with_capacity(len.unwrap_or(0)),
            bytes: Some(Vec::with_capacity(len.unwrap_or(0))),
        })
    }

    fn serialize_tuple(self, len: usize) -> CodecResult<SeqEncoder> {
        self.serialize_seq(Some(len))
    }

    fn serialize_tuple_struct(self, _name: &'static str, len: usize) -> CodecResult<SeqEncoder> {
        self.serialize_seq(Some(len))
    }

    fn serialize_tuple_variant(
        self,
        name: &'static str,
        index: u32,
        variant: &'static str,
        len: usize,
    ) -> CodecResult<Self::SerializeTupleVariant> {
        ser::Serializer::serialize_tuple_variant(serde_json::value::Serializer, name, index, variant, len)
            .map(JsonCompound)
            .map_err(codec_error)
    }

    fn serialize_map(self, len: Option<usize>) -> CodecResult<MapEncoder> {
        Ok(MapEncoder {
            top: self.top,
            fields: Vec::with_capacity(len.unwrap_or(0)),
            json: serde_json::Map::new(),
            key: None,
        })
    }

    fn serialize_struct(self, _name: &'static str, len: usize) -> CodecResult<MapEncoder> {
        self.serialize_map(Some(len))
    }

    fn serialize_struct_variant(
        self,
        name: &'static str,
        index: u32,
        variant: &'static str,
        len: usize,
    ) -> CodecResult<Self::SerializeStructVariant> {
        ser::Serializer::serialize_struct_variant(serde_json::value::Serializer, name, index, variant, len)
            .map(JsonCompound)
            .map_err(codec_error)
    }
}

/// Collects a sequence as JSON, and as raw bytes while every element is a `u8`.
struct SeqEncoder {
    json: Vec<serde_json::Value>,
    bytes: Option<Vec<u8>>,
}

impl SeqEncoder {
    fn push<T: Serialize + ?Sized>(&mut self, value: &T) -> CodecResult<()> {
        self.json
            .push(serde_json::to_value(value).map_err(codec_error)?);
        if self.bytes.is_some() {
            match value.serialize(Encoder::field()) {
                Ok(Encoded::Byte(b)) => {
                    if let Some(bytes) = self.bytes.as_mut() {
                        bytes.push(b);
                    }
                }
                _ => self.bytes = None,
            }
        }
        Ok(())
    }

    fn finish(self) -> CodecResult<Encoded> {
        match self.bytes {
            Some(bytes) if !bytes.is_empty() => Ok(Encoded::Value(Value::Blob(bytes))),
            _ => json_text(&self.json),
        }
    }
}

impl ser::SerializeSeq for SeqEncoder {
    type Ok = Encoded;
    type Error = CodecError;

    fn serialize_element<T: Serialize + ?Sized>(&mut self, value: &T) -> CodecResult<()> {
        self.push(value)
    }

    fn end(self) -> CodecResult<Encoded> {
        self.finish()
    }
}

impl ser::SerializeTuple for SeqEncoder {
    type Ok = Encoded;
    type Error = CodecError;

    fn serialize_element<T: Serialize + ?Sized>(&mut self, value: &T) -> CodecResult<()> {
        self.push(value)
    }

    fn end(self) -> CodecResult<Encoded> {
        self.finish()
    }
}

impl ser::SerializeTupleStruct for SeqEncoder {
    type Ok = Encoded;
    type Error = CodecError;

    fn serialize_field<T: Serialize + ?Sized>(&mut self, value: &T) -> CodecResult<()> {
        self.push(value)
    }

    fn end(self) -> CodecResult<Encoded> {
        self.finish()
    }
}

/// A record's own fields when `top`, a nested map or struct as JSON otherwise.
struct MapEncoder {
    top: bool,
    fields: Vec<(String, Value)>,
    json: serde_json::Map<String, serde_json::Value>,
    key: Option<String>,
}

impl MapEncoder {
    fn insert<T: Serialize + ?Sized>(&mut self, key: String, value: &T) -> CodecResult<()> {
        if self.top {
            let value = value.serialize(Encoder::field())?.into_value()?;
            self.fields.push((key, value));
        } else {
            let value = serde_json::to_value(value).map_err(codec_error)?;
            self.json.insert(key, value);
        }
        Ok(())
    }

    fn finish(self) -> CodecResult<Encoded> {
        if self.top {
            Ok(Encoded::Fields(self.fields))
        } else {
            json_text(&self.json)
        }
    }
}

impl ser::SerializeMap for MapEncoder {
    type Ok = Encoded;
    type Error = CodecError;

    fn serialize_key<T: Serialize + ?Sized>(&mut self, key: &T) -> CodecResult<()> {
        let key = match serde_json::to_value(key).map_err(codec_error)? {
            serde_json::Value::String(s) => s,
            other => other.to_string(),
        };
        self.key = Some(key);
        Ok(())
    }

    fn serialize_value<T: Serialize + ?Sized>(&mut self, value: &T) -> CodecResult<()> {
        let key = self
            .key
            .take()
            .ok_or_else(|| codec_error("map value without a key"))?;
        self.insert(key, value)
    }

    fn end(self) -> CodecResult<Encoded> {
        self.finish()
    }
}

impl ser::SerializeStruct for MapEncoder {
    type Ok = Encoded;
    type Error = CodecError;

    fn serialize_field<T: Serialize + ?Sized>(&mut self, key: &'static str, value: &T) -> CodecResult<()> {
        self.insert(key.to_string(), value)
    }

    fn end(self) -> CodecResult<Encoded> {
        self.finish()
    }
}

/// Data-carrying enum variants, built by serde_json and bound as JSON text.
struct JsonCompound<S>(S);

impl<S> ser::SerializeTupleVariant for JsonCompound<S>
where
    S: ser::SerializeTupleVariant<Ok = serde_json::Value, Error = serde_json::Error>,
{
    type Ok = Encoded;
    type Error = CodecError;

    fn serialize_field<T: Serialize + ?Sized>(&mut self, value: &T) -> CodecResult<()> {
        self.0.serialize_field(value).map_err(codec_error)
    }

    fn end(self) -> CodecResult<Encoded> {
        json_text(&self.0.end().map_err(codec_error)?)
    }
}

impl<S> ser::SerializeStructVariant for JsonCompound<S>
where
    S: ser::SerializeStructVariant<Ok = serde_json::Value, Error = serde_json::Error>,
{
    type Ok = Encoded;
    type Error = CodecError;

    fn serialize_field<T: Serialize + ?Sized>(&mut self, key: &'static str, value: &T) -> CodecResult<()> {
        self.0.serialize_field(key, value).map_err(codec_error)
    }

    fn end(self) -> CodecResult<Encoded> {
        json_text(&self.0.end().map_err(codec_error)?)
    }
}
