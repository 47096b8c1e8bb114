//! Closed, explicitly tagged encoding of recorded return values.
//!
//! Every value a proxied method can return maps onto one `Payload` variant. The
//! `Replayable` trait converts between a Rust value and its payload; `capture`
//! exists for values (byte streams) that cannot be inspected by reference.

use crate::codec::JsonCodec;
use crate::errors::BimockError;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::io::{self, Cursor, Read};

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Payload {
    /// Successful call with no value.
    #[default]
    Unit,
    Null,
    Bool {
        value: bool,
    },
    Int {
        value: i64,
    },
    Uint {
        value: u64,
    },
    /// Non-finite values are written as `"nan"`, `"inf"` or `"-inf"`.
    Float {
        #[serde(with = "float_repr")]
        value: f64,
    },
    Text {
        value: String,
    },
    List {
        #[serde(default)]
        items: Vec<Payload>,
    },
    /// Structured value plus the runtime type it was captured from.
    Json {
        type_tag: String,
        value: Value,
    },
    /// `Some` around a value whose own payload would read back as `None`.
    Some {
        value: Box<Payload>,
    },
    ByteBuffer(ByteBufferRecord),
    Stream {
        base64: String,
    },
}

impl Payload {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Unit => "unit",
            Self::Null => "null",
            Self::Bool { .. } => "bool",
            Self::Int { .. } => "int",
            Self::Uint { .. } => "uint",
            Self::Float { .. } => "float",
            Self::Text { .. } => "text",
            Self::List { .. } => "list",
            Self::Json { .. } => "json",
            Self::Some { .. } => "some",
            Self::ByteBuffer(_) => "byte_buffer",
            Self::Stream { .. } => "stream",
        }
    }
}

// JSON numbers cannot hold NaN or infinities; serde_json would write `null`.
mod float_repr {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    #[derive(Serialize)]
    #[serde(untagged)]
    enum Repr<'a> {
        Number(f64),
        Text(&'a str),
    }

    pub fn serialize<S: Serializer>(value: &f64, serializer: S) -> Result<S::Ok, S::Error> {
        let repr = if value.is_nan() {
            Repr::Text("nan")
        } else if value.is_infinite() {
            Repr::Text(if *value > 0.0 { "inf" } else { "-inf" })
        } else {
            Repr::Number(*value)
        };
        repr.serialize(serializer)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<f64, D::Error> {
        match Owned::deserialize(deserializer)? {
            Owned::Number(value) => Ok(value),
            Owned::Text(text) => match text.as_str() {
                "nan" => Ok(f64::NAN),
                "inf" => Ok(f64::INFINITY),
                "-inf" => Ok(f64::NEG_INFINITY),
                other => Err(serde::de::Error::custom(format!(
                    "unknown float literal {other:?}"
                ))),
            },
        }
    }

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Owned {
        Number(f64),
        Text(String),
    }
}

fn mismatch(expected: &str, found: &Payload) -> BimockError {
    BimockError::Codec(format!(
        "expected {expected} payload, found {}",
        found.kind()
    ))
}

pub trait Replayable: Sized {
    fn to_payload(&self) -> Result<Payload, BimockError>;

    fn from_payload(payload: Payload) -> Result<Self, BimockError>;

    /// Encodes `self` and hands back a value equivalent to the original.
    fn capture(self) -> Result<(Self, Payload), BimockError> {
        let payload = self.to_payload()?;
        Ok((self, payload))
    }
}

impl Replayable for () {
    fn to_payload(&self) -> Result<Payload, BimockError> {
        Ok(Payload::Unit)
    }

    fn from_payload(payload: Payload) -> Result<Self, BimockError> {
        match payload {
            Payload::Unit => Ok(()),
            other => Err(mismatch("unit", &other)),
        }
    }
}

impl Replayable for bool {
    fn to_payload(&self) -> Result<Payload, BimockError> {
        Ok(Payload::Bool { value: *self })
    }

    fn from_payload(payload: Payload) -> Result<Self, BimockError> {
        match payload {
            Payload::Bool { value } => Ok(value),
            other => Err(mismatch("bool", &other)),
        }
    }
}

macro_rules! integer_payload {
    ($variant:ident, $wide:ty, $($t:ty),+) => {$(
        impl Replayable for $t {
            fn to_payload(&self) -> Result<Payload, BimockError> {
                let value = <$wide>::try_from(*self).map_err(|e| {
                    BimockError::Codec(format!("{} out of range: {e}", stringify!($t)))
                })?;
                Ok(Payload::$variant { value })
            }

            fn from_payload(payload: Payload) -> Result<Self, BimockError> {
                let out_of_range = |e: std::num::TryFromIntError| {
                    BimockError::Codec(format!("recorded value does not fit {}: {e}", stringify!($t)))
                };
                match payload {
                    Payload::Int { value } => <$t>::try_from(value).map_err(out_of_range),
                    Payload::Uint { value } => <$t>::try_from(value).map_err(out_of_range),
                    other => Err(mismatch(stringify!($t), &other)),
                }
            }
        }
    )+};
}

integer_payload!(Int, i64, i8, i16, i32, isize);
integer_payload!(Uint, u64, u8, u16, u32, usize);

// `i64`/`u64` convert to themselves infallibly, which the macro cannot express.
impl Replayable for i64 {
    fn to_payload(&self) -> Result<Payload, BimockError> {
        Ok(Payload::Int { value: *self })
    }

    fn from_payload(payload: Payload) -> Result<Self, BimockError> {
        match payload {
            Payload::Int { value } => Ok(value),
            Payload::Uint { value } => i64::try_from(value)
                .map_err(|e| BimockError::Codec(format!("recorded value does not fit i64: {e}"))),
            other => Err(mismatch("i64", &other)),
        }
    }
}

impl Replayable for u64 {
    fn to_payload(&self) -> Result<Payload, BimockError> {
        Ok(Payload::Uint { value: *self })
    }

    fn from_payload(payload: Payload) -> Result<Self, BimockError> {
        match payload {
            Payload::Uint { value } => Ok(value),
            Payload::Int { value } => u64::try_from(value)
                .map_err(|e| BimockError::Codec(format!("recorded value does not fit u64: {e}"))),
            other => Err(mismatch("u64", &other)),
        }
    }
}

impl Replayable for f64 {
    fn to_payload(&self) -> Result<Payload, BimockError> {
        Ok(Payload::Float { value: *self })
    }

    fn from_payload(payload: Payload) -> Result<Self, BimockError> {
        match payload {
            Payload::Float { value } => Ok(value),
            other => Err(mismatch("f64", &other)),
        }
    }
}

impl Replayable for f32 {
    fn to_payload(&self) -> Result<Payload, BimockError> {
        Ok(Payload::Float {
            value: f64::from(*self),
        })
    }

    fn from_payload(payload: Payload) -> Result<Self, BimockError> {
        match payload {
            Payload::Float { value } => Ok(value as f32),
            other => Err(mismatch("f32", &other)),
        }
    }
}

impl Replayable for String {
    fn to_payload(&self) -> Result<Payload, BimockError> {
        Ok(Payload::Text {
            value: self.clone(),
        })
    }

    fn from_payload(payload: Payload) -> Result<Self, BimockError> {
        match payload {
            Payload::Text { value } => Ok(value),
            other => Err(mismatch("text", &other)),
        }
    }
}

impl<T: Replayable> Replayable for Option<T> {
    fn to_payload(&self) -> Result<Payload, BimockError> {
        match self {
            Some(value) => value.to_payload().map(wrap_some),
            None => Ok(Payload::Null),
        }
    }

    fn from_payload(payload: Payload) -> Result<Self, BimockError> {
        match payload {
            Payload::Null => Ok(None),
            Payload::Some { value } => T::from_payload(*value).map(Some),
            other => T::from_payload(other).map(Some),
        }
    }

    fn capture(self) -> Result<(Self, Payload), BimockError> {
        match self {
            Some(value) => {
                let (value, payload) = value.capture()?;
                Ok((Some(value), wrap_some(payload)))
            }
            None => Ok((None, Payload::Null)),
        }
    }
}

// Plain `Some(x)` is stored as `x`; only payloads that would otherwise decode
// as an outer `None` (or as another layer) need the explicit wrapper.
fn wrap_some(inner: Payload) -> Payload {
    match inner {
        Payload::Null | Payload::Some { .. } => Payload::Some {
            value: Box::new(inner),
        },
        other => other,
    }
}

impl<T: Replayable> Replayable for Vec<T> {
    fn to_payload(&self) -> Result<Payload, BimockError> {
        let items = self
            .iter()
            .map(Replayable::to_payload)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Payload::List { items })
    }

    fn from_payload(payload: Payload) -> Result<Self, BimockError> {
        match payload {
            Payload::List { items } => items.into_iter().map(T::from_payload).collect(),
            other => Err(mismatch("list", &other)),
        }
    }

    fn capture(self) -> Result<(Self, Payload), BimockError> {
        let mut values = Vec::with_capacity(self.len());
        let mut items = Vec::with_capacity(self.len());
        for value in self {
            let (value, payload) = value.capture()?;
            values.push(value);
            items.push(payload);
        }
        Ok((values, Payload::List { items }))
    }
}

/// Any serde value, tagged with its Rust type so replay cannot silently
/// decode it into a different shape.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Json<T>(pub T);

impl<T> Json<T> {
    pub fn into_inner(self) -> T {
        self.0
    }

    pub fn type_tag() -> &'static str {
        std::any::type_name::<T>()
    }
}

impl<T: Serialize + DeserializeOwned> Replayable for Json<T> {
    fn to_payload(&self) -> Result<Payload, BimockError> {
        let value = JsonCodec.to_json_value(&self.0)?;
        Ok(Payload::Json {
            type_tag: Self::type_tag().to_string(),
            value,
        })
    }

    fn from_payload(payload: Payload) -> Result<Self, BimockError> {
        match payload {
            Payload::Json { type_tag, value } => {
                if type_tag != Self::type_tag() {
                    return Err(BimockError::Codec(format!(
                        "recorded {type_tag}, expected {}",
                        Self::type_tag()
                    )));
                }
                JsonCodec.from_json_value(value).map(Json)
            }
            other => Err(mismatch("json", &other)),
        }
    }
}

// ── ByteBuffer ────────────────────────────────────────────────────────────────

/// Wire form of a [`ByteBuffer`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ByteBufferRecord {
    pub base64: String,
    pub position: Option<usize>,
    pub limit: Option<usize>,
    pub capacity: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mark: Option<usize>,
}

/// Fixed-capacity byte buffer with a read cursor, limit and optional mark.
///
/// Always `mark <= position <= limit <= capacity`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ByteBuffer {
    data: Vec<u8>,
    position: usize,
    limit: usize,
    mark: Option<usize>,
}

impl ByteBuffer {
    pub fn wrap(data: Vec<u8>) -> Self {
        let limit = data.len();
        Self {
            data,
            position: 0,
            limit,
            mark: None,
        }
    }

    pub fn from_parts(
        data: Vec<u8>,
        position: usize,
        limit: usize,
        mark: Option<usize>,
    ) -> Result<Self, BimockError> {
        if limit > data.len() {
            return Err(BimockError::Codec(format!(
                "byte buffer limit {limit} exceeds capacity {}",
                data.len()
            )));
        }
        if position > limit {
            return Err(BimockError::Codec(format!(
                "byte buffer position {position} exceeds limit {limit}"
            )));
        }
        if let Some(mark) = mark {
            if mark > position {
                return Err(BimockError::Codec(format!(
                    "byte buffer mark {mark} exceeds position {position}"
                )));
            }
        }
        Ok(Self {
            data,
            position,
            limit,
            mark,
        })
    }

    pub fn capacity(&self) -> usize {
        self.data.len()
    }

    pub fn position(&self) -> usize {
        self.position
    }

    pub fn limit(&self) -> usize {
        self.limit
    }

    pub fn mark_position(&self) -> Option<usize> {
        self.mark
    }

    pub fn set_position(&mut self, position: usize) -> Result<(), BimockError> {
        if position > self.limit {
            return Err(BimockError::Codec(format!(
                "position {position} exceeds limit {}",
                self.limit
            )));
        }
        if self.mark.is_some_and(|mark| mark > position) {
            self.mark = None;
        }
        self.position = position;
        Ok(())
    }

    pub fn mark(&mut self) {
        self.mark = Some(self.position);
    }

    /// Rewinds to the mark; a no-op when no mark is set.
    pub fn reset(&mut self) {
        if let Some(mark) = self.mark {
            self.position = mark;
        }
    }

    pub fn remaining(&self) -> &[u8] {
        &self.data[self.position..self.limit]
    }

    pub fn get(&mut self) -> Option<u8> {
        if self.position >= self.limit {
            return None;
        }
        let byte = self.data[self.position];
        self.position += 1;
        Some(byte)
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.data
    }

    pub fn into_inner(self) -> Vec<u8> {
        self.data
    }
}

impl Replayable for ByteBuffer {
    fn to_payload(&self) -> Result<Payload, BimockError> {
        Ok(Payload::ByteBuffer(ByteBufferRecord {
            base64: STANDARD.encode(&self.data),
            position: Some(self.position),
            limit: Some(self.limit),
            capacity: Some(self.data.len()),
            mark: self.mark,
        }))
    }

    fn from_payload(payload: Payload) -> Result<Self, BimockError> {
        let record = match payload {
            Payload::ByteBuffer(record) => record,
            other => return Err(mismatch("byte_buffer", &other)),
        };
        let data = STANDARD
            .decode(record.base64.as_bytes())
            .map_err(|e| BimockError::Codec(format!("byte buffer base64: {e}")))?;
        if let Some(capacity) = record.capacity {
            if capacity != data.len() {
                return Err(BimockError::Codec(format!(
                    "byte buffer capacity {capacity} does not match {} decoded bytes",
                    data.len()
                )));
            }
        }
        let limit = record.limit.unwrap_or(data.len());
        ByteBuffer::from_parts(data, record.position.unwrap_or(0), limit, record.mark)
    }
}

// ── ByteStream ────────────────────────────────────────────────────────────────

/// A byte source returned from a proxied call.
///
/// Streams cannot be re-read once drained, so recording materializes them into
/// memory and hands the caller an in-memory stream with the same contents.
pub struct ByteStream {
    reader: Box<dyn Read + Send>,
}

impl ByteStream {
    pub fn new(reader: impl Read + Send + 'static) -> Self {
        Self {
            reader: Box::new(reader),
        }
    }

    pub fn from_bytes(bytes: Vec<u8>) -> Self {
        Self::new(Cursor::new(bytes))
    }

    pub fn read_to_vec(mut self) -> io::Result<Vec<u8>> {
        let mut bytes = Vec::new();
        self.reader.read_to_end(&mut bytes)?;
        Ok(bytes)
    }
}

impl Read for ByteStream {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.reader.read(buf)
    }
}

impl fmt::Debug for ByteStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ByteStream").finish_non_exhaustive()
    }
}

impl Replayable for ByteStream {
    fn to_payload(&self) -> Result<Payload, BimockError> {
        Err(BimockError::Codec(
            "byte streams can only be recorded by value".to_string(),
        ))
    }

    fn from_payload(payload: Payload) -> Result<Self, BimockError> {
        match payload {
            Payload::Stream { base64 } => STANDARD
                .decode(base64.as_bytes())
                .map(ByteStream::from_bytes)
                .map_err(|e| BimockError::Codec(format!("stream base64: {e}"))),
            other => Err(mismatch("stream", &other)),
        }
    }

    fn capture(self) -> Result<(Self, Payload), BimockError> {
        let bytes = self
            .read_to_vec()
            .map_err(|e| BimockError::Io(format!("drain byte stream: {e}")))?;
        let payload = Payload::Stream {
            base64: STANDARD.encode(&bytes),
        };
        Ok((ByteStream::from_bytes(bytes), payload))
    }
}
