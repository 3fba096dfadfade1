//! The typed value domain and its cross-type total order.
//!
//! Every document field holds a `Value`. Values of different types compare
//! according to a fixed type ordering; within a type the natural ordering of
//! that type applies. Integers and doubles are the one exception: they form a
//! single "number" type for both comparison and equality.

use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::fmt::Write as _;

use crate::key::DocumentKey;
use crate::types::{DatabaseId, Timestamp};

/// Reserved map key marking a typed map value.
pub const TYPE_KEY: &str = "__type__";

/// Discriminator for vector values.
pub const VECTOR_TYPE: &str = "__vector__";

/// Map key carrying a vector's numeric components.
pub const VECTOR_VALUE_KEY: &str = "value";

#[derive(Debug, Clone)]
pub enum Value {
	Null,
	Boolean(bool),
	Integer(i64),
	Double(f64),
	Timestamp(Timestamp),
	/// Pending server timestamp. Exists only in local views: carries the
	/// local write time and, when the field previously held a value, that
	/// value for use as the display estimate.
	ServerTimestamp {
		local_write_time: Timestamp,
		previous: Option<Box<Value>>,
	},
	String(String),
	Bytes(Vec<u8>),
	Reference {
		database: DatabaseId,
		key: DocumentKey,
	},
	GeoPoint {
		latitude: f64,
		longitude: f64,
	},
	Array(Vec<Value>),
	Map(BTreeMap<String, Value>),
}

/// The fixed ordering of value types. Integers and doubles share `Number`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum TypeOrder {
	Null,
	Boolean,
	Number,
	Timestamp,
	ServerTimestamp,
	String,
	Bytes,
	Reference,
	GeoPoint,
	Array,
	Vector,
	Map,
}

impl Value {
	pub fn map() -> Value {
		Value::Map(BTreeMap::new())
	}

	pub fn type_order(&self) -> TypeOrder {
		match self {
			Value::Null => TypeOrder::Null,
			Value::Boolean(_) => TypeOrder::Boolean,
			Value::Integer(_) | Value::Double(_) => TypeOrder::Number,
			Value::Timestamp(_) => TypeOrder::Timestamp,
			Value::ServerTimestamp { .. } => TypeOrder::ServerTimestamp,
			Value::String(_) => TypeOrder::String,
			Value::Bytes(_) => TypeOrder::Bytes,
			Value::Reference { .. } => TypeOrder::Reference,
			Value::GeoPoint { .. } => TypeOrder::GeoPoint,
			Value::Array(_) => TypeOrder::Array,
			Value::Map(fields) => {
				if is_vector_fields(fields) {
					TypeOrder::Vector
				} else {
					TypeOrder::Map
				}
			}
		}
	}

	pub fn is_null(&self) -> bool {
		matches!(self, Value::Null)
	}

	pub fn is_nan(&self) -> bool {
		matches!(self, Value::Double(d) if d.is_nan())
	}

	pub fn is_number(&self) -> bool {
		self.type_order() == TypeOrder::Number
	}

	pub fn is_array(&self) -> bool {
		matches!(self, Value::Array(_))
	}

	pub fn is_map(&self) -> bool {
		matches!(self, Value::Map(_))
	}

	pub fn as_array(&self) -> Option<&[Value]> {
		match self {
			Value::Array(values) => Some(values),
			_ => None,
		}
	}

	pub fn as_map(&self) -> Option<&BTreeMap<String, Value>> {
		match self {
			Value::Map(fields) => Some(fields),
			_ => None,
		}
	}

	/// Builds a vector value from its numeric components.
	pub fn vector(components: Vec<f64>) -> Value {
		let mut fields = BTreeMap::new();
		fields.insert(TYPE_KEY.to_string(), Value::String(VECTOR_TYPE.to_string()));
		fields.insert(
			VECTOR_VALUE_KEY.to_string(),
			Value::Array(components.into_iter().map(Value::Double).collect()),
		);
		Value::Map(fields)
	}

	/// Converts a JSON value. Numbers become integers when they fit, doubles
	/// otherwise; objects and arrays convert recursively.
	pub fn from_json(json: &serde_json::Value) -> Value {
		match json {
			serde_json::Value::Null => Value::Null,
			serde_json::Value::Bool(b) => Value::Boolean(*b),
			serde_json::Value::Number(n) => match n.as_i64() {
				Some(i) => Value::Integer(i),
				None => Value::Double(n.as_f64().unwrap_or(f64::NAN)),
			},
			serde_json::Value::String(s) => Value::String(s.clone()),
			serde_json::Value::Array(values) => {
				Value::Array(values.iter().map(Value::from_json).collect())
			}
			serde_json::Value::Object(fields) => Value::Map(
				fields.iter().map(|(k, v)| (k.clone(), Value::from_json(v))).collect(),
			),
		}
	}

	/// A deterministic string form used in canonical target ids.
	pub fn canonical_id(&self) -> String {
		let mut out = String::new();
		self.write_canonical_id(&mut out);
		out
	}

	fn write_canonical_id(&self, out: &mut String) {
		match self {
			Value::Null => out.push_str("null"),
			Value::Boolean(b) => {
				let _ = write!(out, "{}", b);
			}
			Value::Integer(i) => {
				let _ = write!(out, "{}", i);
			}
			Value::Double(d) => {
				let _ = write!(out, "{:?}", d);
			}
			Value::Timestamp(t) => {
				let _ = write!(out, "{}", t);
			}
			Value::ServerTimestamp { local_write_time, .. } => {
				let _ = write!(out, "server_timestamp({})", local_write_time);
			}
			Value::String(s) => out.push_str(s),
			Value::Bytes(bytes) => {
				for byte in bytes {
					let _ = write!(out, "{:02x}", byte);
				}
			}
			Value::Reference { database, key } => {
				let _ = write!(out, "{}/documents/{}", database, key);
			}
			Value::GeoPoint { latitude, longitude } => {
				let _ = write!(out, "geo({:?},{:?})", latitude, longitude);
			}
			Value::Array(values) => {
				out.push('[');
				for (i, value) in values.iter().enumerate() {
					if i > 0 {
						out.push(',');
					}
					value.write_canonical_id(out);
				}
				out.push(']');
			}
			Value::Map(fields) => {
				out.push('{');
				for (i, (k, v)) in fields.iter().enumerate() {
					if i > 0 {
						out.push(',');
					}
					out.push_str(k);
					out.push(':');
					v.write_canonical_id(out);
				}
				out.push('}');
			}
		}
	}
}

fn is_vector_fields(fields: &BTreeMap<String, Value>) -> bool {
	matches!(fields.get(TYPE_KEY), Some(Value::String(tag)) if tag == VECTOR_TYPE)
}

/// True when values of these types are mutually comparable for filters.
pub fn comparable(a: TypeOrder, b: TypeOrder) -> bool {
	a == b
}

/// Total order over all values: by type order first, then within the type.
pub fn compare(a: &Value, b: &Value) -> Ordering {
	let (ta, tb) = (a.type_order(), b.type_order());
	if ta != tb {
		return ta.cmp(&tb);
	}

	match (a, b) {
		(Value::Null, Value::Null) => Ordering::Equal,
		(Value::Boolean(x), Value::Boolean(y)) => x.cmp(y),
		_ if ta == TypeOrder::Number => compare_numbers(a, b),
		(Value::Timestamp(x), Value::Timestamp(y)) => x.cmp(y),
		(
			Value::ServerTimestamp { local_write_time: x, .. },
			Value::ServerTimestamp { local_write_time: y, .. },
		) => x.cmp(y),
		(Value::String(x), Value::String(y)) => x.cmp(y),
		(Value::Bytes(x), Value::Bytes(y)) => x.cmp(y),
		(
			Value::Reference { database: da, key: ka },
			Value::Reference { database: db, key: kb },
		) => da.cmp(db).then_with(|| ka.cmp(kb)),
		(
			Value::GeoPoint { latitude: lat_a, longitude: lng_a },
			Value::GeoPoint { latitude: lat_b, longitude: lng_b },
		) => compare_doubles(*lat_a, *lat_b).then_with(|| compare_doubles(*lng_a, *lng_b)),
		(Value::Array(x), Value::Array(y)) => compare_arrays(x, y),
		(Value::Map(x), Value::Map(y)) if ta == TypeOrder::Vector => compare_vectors(x, y),
		(Value::Map(x), Value::Map(y)) => compare_maps(x, y),
		_ => unreachable!("type orders matched but variants did not"),
	}
}

/// True when two values are equal. Cross-type equality is always false,
/// except integers and doubles which compare numerically.
pub fn equals(a: &Value, b: &Value) -> bool {
	compare(a, b) == Ordering::Equal
}

fn compare_numbers(a: &Value, b: &Value) -> Ordering {
	match (a, b) {
		(Value::Integer(x), Value::Integer(y)) => x.cmp(y),
		(Value::Double(x), Value::Double(y)) => compare_doubles(*x, *y),
		(Value::Integer(x), Value::Double(y)) => compare_doubles(*x as f64, *y),
		(Value::Double(x), Value::Integer(y)) => compare_doubles(*x, *y as f64),
		_ => unreachable!("compare_numbers called on non-numbers"),
	}
}

/// IEEE comparison extended to a total order: NaN sorts before every number
/// and equal to itself, and -0.0 equals 0.0.
fn compare_doubles(x: f64, y: f64) -> Ordering {
	match x.partial_cmp(&y) {
		Some(ordering) => ordering,
		None => match (x.is_nan(), y.is_nan()) {
			(true, true) => Ordering::Equal,
			(true, false) => Ordering::Less,
			(false, true) => Ordering::Greater,
			(false, false) => unreachable!("partial_cmp is None only for NaN"),
		},
	}
}

fn compare_arrays(x: &[Value], y: &[Value]) -> Ordering {
	for (a, b) in x.iter().zip(y.iter()) {
		let ordering = compare(a, b);
		if ordering != Ordering::Equal {
			return ordering;
		}
	}
	x.len().cmp(&y.len())
}

/// Vectors compare by dimension first, then component-wise.
fn compare_vectors(x: &BTreeMap<String, Value>, y: &BTreeMap<String, Value>) -> Ordering {
	let empty: &[Value] = &[];
	let xs = x.get(VECTOR_VALUE_KEY).and_then(Value::as_array).unwrap_or(empty);
	let ys = y.get(VECTOR_VALUE_KEY).and_then(Value::as_array).unwrap_or(empty);
	xs.len().cmp(&ys.len()).then_with(|| compare_arrays(xs, ys))
}

fn compare_maps(x: &BTreeMap<String, Value>, y: &BTreeMap<String, Value>) -> Ordering {
	let mut xs = x.iter();
	let mut ys = y.iter();
	loop {
		match (xs.next(), ys.next()) {
			(Some((ka, va)), Some((kb, vb))) => {
				let ordering = ka.cmp(kb).then_with(|| compare(va, vb));
				if ordering != Ordering::Equal {
					return ordering;
				}
			}
			(Some(_), None) => return Ordering::Greater,
			(None, Some(_)) => return Ordering::Less,
			(None, None) => return Ordering::Equal,
		}
	}
}

impl PartialEq for Value {
	fn eq(&self, other: &Self) -> bool {
		equals(self, other)
	}
}

impl Eq for Value {}

impl PartialOrd for Value {
	fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
		Some(compare(self, other))
	}
}

impl Ord for Value {
	fn cmp(&self, other: &Self) -> Ordering {
		compare(self, other)
	}
}


// vim: ts=4
