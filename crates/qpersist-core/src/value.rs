// Encodable object graph.
//
// `Value<'a>` is a closed set of tagged variants the encoder understands:
// plain JSON shapes, plus complex numbers, timestamps, array-like numeric
// buffers and capability-based domain objects. Most variants borrow from the
// object being saved, so building a tree for a large result copies nothing.
use std::borrow::Cow;
use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime, Timelike, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::EncodeError;

#[derive(Debug, Clone)]
pub enum Value<'a> {
    Null,
    Bool(bool),
    Int(i64),
    UInt(u64),
    Float(f64),
    Str(Cow<'a, str>),
    List(Vec<Value<'a>>),
    Dict(Vec<(Cow<'a, str>, Value<'a>)>),
    Complex(Complex),
    Timestamp(Timestamp),
    /// Array-like numeric buffer; encoded through `NdArray::to_list`.
    Array(Cow<'a, NdArray>),
    /// Object exposing `to_list` and/or `to_dict`.
    Object(&'a dyn DomainObject),
    /// Anything else. Carries the type name for the error message.
    Opaque(Cow<'a, str>),
}

impl<'a> Value<'a> {
    pub fn str(s: impl Into<Cow<'a, str>>) -> Self {
        Value::Str(s.into())
    }

    pub fn opaque(type_name: impl Into<Cow<'a, str>>) -> Self {
        Value::Opaque(type_name.into())
    }

    /// Name used in "not JSON serializable" errors.
    pub fn type_name(&self) -> Cow<'_, str> {
        match self {
            Value::Null => "null".into(),
            Value::Bool(_) => "bool".into(),
            Value::Int(_) | Value::UInt(_) => "int".into(),
            Value::Float(_) => "float".into(),
            Value::Str(_) => "str".into(),
            Value::List(_) => "list".into(),
            Value::Dict(_) => "dict".into(),
            Value::Complex(_) => "complex".into(),
            Value::Timestamp(_) => "datetime".into(),
            Value::Array(_) => "ndarray".into(),
            Value::Object(o) => Cow::Borrowed(o.type_name()),
            Value::Opaque(name) => Cow::Borrowed(&**name),
        }
    }
}

/// Small builder for `Value::Dict` entries, keeps `to_dict` impls readable.
#[derive(Debug, Default)]
pub struct DictBuilder<'a> {
    entries: Vec<(Cow<'a, str>, Value<'a>)>,
}

impl<'a> DictBuilder<'a> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn entry(mut self, key: &'a str, value: Value<'a>) -> Self {
        self.entries.push((Cow::Borrowed(key), value));
        self
    }

    /// Adds the entry only when `value` is `Some`.
    pub fn optional<T: ToValue + ?Sized>(mut self, key: &'a str, value: Option<&'a T>) -> Self {
        if let Some(v) = value {
            self.entries.push((Cow::Borrowed(key), v.to_value()));
        }
        self
    }

    /// Appends every entry of a raw JSON mapping, in its order.
    pub fn extend(mut self, map: &'a serde_json::Map<String, serde_json::Value>) -> Self {
        self.entries.extend(
            map.iter()
                .map(|(k, v)| (Cow::Borrowed(k.as_str()), v.to_value())),
        );
        self
    }

    pub fn build(self) -> Vec<(Cow<'a, str>, Value<'a>)> {
        self.entries
    }
}

/// Capabilities an object can expose to the encoder.
///
/// The encoder asks for `to_list` first and only falls back to `to_dict`
/// when no sequence form exists. An object exposing neither is rejected.
pub trait DomainObject: fmt::Debug {
    fn type_name(&self) -> &str {
        std::any::type_name::<Self>()
    }

    fn to_list(&self) -> Option<Value<'_>> {
        None
    }

    fn to_dict(&self) -> Option<Vec<(Cow<'_, str>, Value<'_>)>> {
        None
    }
}

/// Conversion into the encodable graph.
pub trait ToValue {
    fn to_value(&self) -> Value<'_>;
}

// -------- Complex numbers --------

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Complex {
    pub re: f64,
    pub im: f64,
}

impl Complex {
    pub const fn new(re: f64, im: f64) -> Self {
        Self { re, im }
    }

    pub fn norm_sqr(&self) -> f64 {
        self.re * self.re + self.im * self.im
    }
}

impl From<f64> for Complex {
    fn from(re: f64) -> Self {
        Self { re, im: 0.0 }
    }
}

impl fmt::Display for Complex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.im.is_sign_negative() {
            write!(f, "{}-{}j", self.re, -self.im)
        } else {
            write!(f, "{}+{}j", self.re, self.im)
        }
    }
}

// Written as `[re, im]`; a bare number is read as a real value.
impl Serialize for Complex {
    fn serialize<S: Serializer>(&self, s: S) -> Result<S::Ok, S::Error> {
        [self.re, self.im].serialize(s)
    }
}

impl<'de> Deserialize<'de> for Complex {
    fn deserialize<D: Deserializer<'de>>(d: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Repr {
            Pair([f64; 2]),
            Real(f64),
        }
        Ok(match Repr::deserialize(d)? {
            Repr::Pair([re, im]) => Complex { re, im },
            Repr::Real(re) => Complex::from(re),
        })
    }
}

// -------- Timestamps --------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Timestamp {
    Naive(NaiveDateTime),
    Aware(DateTime<FixedOffset>),
}

const ISO_SECONDS: &str = "%Y-%m-%dT%H:%M:%S";

impl Timestamp {
    /// ISO-8601 text: seconds precision, `.ffffff` only when the microsecond
    /// part is non-zero, `+HH:MM` suffix for offset-aware values.
    pub fn to_iso(&self) -> String {
        match self {
            Timestamp::Naive(dt) => iso_naive(dt),
            Timestamp::Aware(dt) => {
                let mut out = iso_naive(&dt.naive_local());
                out.push_str(&dt.format("%:z").to_string());
                out
            }
        }
    }

    /// Accepts `to_iso` output, a trailing `Z`, a space separator and bare dates.
    pub fn parse_iso(s: &str) -> Option<Self> {
        let s = s.trim();
        let zulu;
        let s = match s.strip_suffix('Z').or_else(|| s.strip_suffix('z')) {
            Some(head) => {
                zulu = format!("{head}+00:00");
                zulu.as_str()
            }
            None => s,
        };
        for fmt in [
            "%Y-%m-%dT%H:%M:%S%.f%:z",
            "%Y-%m-%d %H:%M:%S%.f%:z",
            "%Y-%m-%dT%H:%M:%S%.f%z",
        ] {
            if let Ok(dt) = DateTime::parse_from_str(s, fmt) {
                return Some(Timestamp::Aware(dt));
            }
        }
        for fmt in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M"] {
            if let Ok(dt) = NaiveDateTime::parse_from_str(s, fmt) {
                return Some(Timestamp::Naive(dt));
            }
        }
        NaiveDate::parse_from_str(s, "%Y-%m-%d")
            .ok()
            .and_then(|d| d.and_hms_opt(0, 0, 0))
            .map(Timestamp::Naive)
    }
}

fn iso_naive(dt: &NaiveDateTime) -> String {
    let base = dt.format(ISO_SECONDS).to_string();
    // Leap seconds carry nanosecond() >= 1e9; clamp to the last microsecond.
    let micros = (dt.nanosecond() / 1_000).min(999_999);
    if micros == 0 {
        base
    } else {
        format!("{base}.{micros:06}")
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_iso())
    }
}

impl From<NaiveDateTime> for Timestamp {
    fn from(dt: NaiveDateTime) -> Self {
        Timestamp::Naive(dt)
    }
}

impl From<DateTime<FixedOffset>> for Timestamp {
    fn from(dt: DateTime<FixedOffset>) -> Self {
        Timestamp::Aware(dt)
    }
}

impl From<DateTime<Utc>> for Timestamp {
    fn from(dt: DateTime<Utc>) -> Self {
        Timestamp::Aware(dt.fixed_offset())
    }
}

impl Serialize for Timestamp {
    fn serialize<S: Serializer>(&self, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&self.to_iso())
    }
}

impl<'de> Deserialize<'de> for Timestamp {
    fn deserialize<D: Deserializer<'de>>(d: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(d)?;
        Timestamp::parse_iso(&raw)
            .ok_or_else(|| serde::de::Error::custom(format!("invalid ISO-8601 timestamp: {raw}")))
    }
}

// -------- Array-like numeric buffers --------

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Element {
    Int(i64),
    Float(f64),
    Complex(Complex),
}

impl From<i64> for Element {
    fn from(v: i64) -> Self {
        Element::Int(v)
    }
}

impl From<f64> for Element {
    fn from(v: f64) -> Self {
        Element::Float(v)
    }
}

impl From<Complex> for Element {
    fn from(v: Complex) -> Self {
        Element::Complex(v)
    }
}

impl Element {
    fn to_value(self) -> Value<'static> {
        match self {
            Element::Int(i) => Value::Int(i),
            Element::Float(f) => Value::Float(f),
            Element::Complex(c) => Value::Complex(c),
        }
    }

    pub fn as_complex(&self) -> Complex {
        match *self {
            Element::Int(i) => Complex::from(i as f64),
            Element::Float(f) => Complex::from(f),
            Element::Complex(c) => c,
        }
    }
}

/// Dense row-major buffer with a shape, like a numeric ndarray.
#[derive(Debug, Clone, PartialEq)]
pub struct NdArray {
    shape: Vec<usize>,
    data: Vec<Element>,
}

impl NdArray {
    pub fn new(shape: Vec<usize>, data: Vec<Element>) -> Result<Self, EncodeError> {
        let expected: usize = shape.iter().product();
        if expected != data.len() {
            return Err(EncodeError::Shape {
                shape,
                expected,
                actual: data.len(),
            });
        }
        Ok(Self { shape, data })
    }

    /// One-dimensional array.
    pub fn from_vec<E: Into<Element>>(items: Vec<E>) -> Self {
        let data: Vec<Element> = items.into_iter().map(Into::into).collect();
        Self {
            shape: vec![data.len()],
            data,
        }
    }

    /// Two-dimensional array; ragged rows are a shape error.
    pub fn from_rows<E: Into<Element>>(rows: Vec<Vec<E>>) -> Result<Self, EncodeError> {
        let cols = rows.first().map_or(0, Vec::len);
        let shape = vec![rows.len(), cols];
        let data: Vec<Element> = rows.into_iter().flatten().map(Into::into).collect();
        Self::new(shape, data)
    }

    pub fn scalar<E: Into<Element>>(item: E) -> Self {
        Self {
            shape: Vec::new(),
            data: vec![item.into()],
        }
    }

    pub fn shape(&self) -> &[usize] {
        &self.shape
    }

    pub fn ndim(&self) -> usize {
        self.shape.len()
    }

    pub fn data(&self) -> &[Element] {
        &self.data
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Nested lists following the shape. Zero-dimensional arrays yield the scalar.
    pub fn to_list(&self) -> Value<'static> {
        nest(&self.shape, &self.data)
    }
}

fn nest(shape: &[usize], data: &[Element]) -> Value<'static> {
    match shape.split_first() {
        None => data.first().map_or(Value::Null, |e| e.to_value()),
        Some((&n, rest)) => {
            let stride: usize = rest.iter().product();
            Value::List(
                (0..n)
                    .map(|i| nest(rest, &data[i * stride..(i + 1) * stride]))
                    .collect(),
            )
        }
    }
}

// -------- ToValue impls --------

impl ToValue for Value<'_> {
    fn to_value(&self) -> Value<'_> {
        self.clone()
    }
}

impl ToValue for bool {
    fn to_value(&self) -> Value<'_> {
        Value::Bool(*self)
    }
}

macro_rules! signed_to_value {
    ($($t:ty),*) => {$(
        impl ToValue for $t {
            fn to_value(&self) -> Value<'_> {
                Value::Int(*self as i64)
            }
        }
    )*};
}

macro_rules! unsigned_to_value {
    ($($t:ty),*) => {$(
        impl ToValue for $t {
            fn to_value(&self) -> Value<'_> {
                Value::UInt(*self as u64)
            }
        }
    )*};
}

signed_to_value!(i8, i16, i32, i64, isize);
unsigned_to_value!(u8, u16, u32, u64, usize);

impl ToValue for f32 {
    fn to_value(&self) -> Value<'_> {
        Value::Float(f64::from(*self))
    }
}

impl ToValue for f64 {
    fn to_value(&self) -> Value<'_> {
        Value::Float(*self)
    }
}

impl ToValue for str {
    fn to_value(&self) -> Value<'_> {
        Value::Str(Cow::Borrowed(self))
    }
}

impl ToValue for String {
    fn to_value(&self) -> Value<'_> {
        Value::Str(Cow::Borrowed(self.as_str()))
    }
}

impl ToValue for Complex {
    fn to_value(&self) -> Value<'_> {
        Value::Complex(*self)
    }
}

impl ToValue for Timestamp {
    fn to_value(&self) -> Value<'_> {
        Value::Timestamp(*self)
    }
}

impl ToValue for NaiveDateTime {
    fn to_value(&self) -> Value<'_> {
        Value::Timestamp(Timestamp::Naive(*self))
    }
}

impl ToValue for DateTime<FixedOffset> {
    fn to_value(&self) -> Value<'_> {
        Value::Timestamp(Timestamp::Aware(*self))
    }
}

impl ToValue for DateTime<Utc> {
    fn to_value(&self) -> Value<'_> {
        Value::Timestamp(Timestamp::from(*self))
    }
}

impl ToValue for NdArray {
    fn to_value(&self) -> Value<'_> {
        Value::Array(Cow::Borrowed(self))
    }
}

impl<T: ToValue> ToValue for Option<T> {
    fn to_value(&self) -> Value<'_> {
        match self {
            Some(v) => v.to_value(),
            None => Value::Null,
        }
    }
}

impl<T: ToValue> ToValue for [T] {
    fn to_value(&self) -> Value<'_> {
        Value::List(self.iter().map(ToValue::to_value).collect())
    }
}

impl<T: ToValue> ToValue for Vec<T> {
    fn to_value(&self) -> Value<'_> {
        self.as_slice().to_value()
    }
}

impl<T: ToValue + ?Sized> ToValue for &T {
    fn to_value(&self) -> Value<'_> {
        (**self).to_value()
    }
}

impl<K: AsRef<str>, V: ToValue> ToValue for BTreeMap<K, V> {
    fn to_value(&self) -> Value<'_> {
        Value::Dict(
            self.iter()
                .map(|(k, v)| (Cow::Borrowed(k.as_ref()), v.to_value()))
                .collect(),
        )
    }
}

impl ToValue for serde_json::Value {
    fn to_value(&self) -> Value<'_> {
        match self {
            serde_json::Value::Null => Value::Null,
            serde_json::Value::Bool(b) => Value::Bool(*b),
            serde_json::Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    Value::Int(i)
                } else if let Some(u) = n.as_u64() {
                    Value::UInt(u)
                } else {
                    n.as_f64().map_or(Value::Null, Value::Float)
                }
            }
            serde_json::Value::String(s) => Value::Str(Cow::Borrowed(s.as_str())),
            serde_json::Value::Array(items) => {
                Value::List(items.iter().map(ToValue::to_value).collect())
            }
            serde_json::Value::Object(map) => map.to_value(),
        }
    }
}

impl ToValue for serde_json::Map<String, serde_json::Value> {
    fn to_value(&self) -> Value<'_> {
        Value::Dict(
            self.iter()
                .map(|(k, v)| (Cow::Borrowed(k.as_str()), v.to_value()))
                .collect(),
        )
    }
}
