//! Content fingerprints used as graph identities.
//!
//! Two structurally equal JSON values always hash to the same fingerprint: object keys are written
//! in sorted order regardless of how the map was built.

use std::{
	fmt::{Debug, Display, Formatter},
	str::FromStr,
};

use serde::{Deserialize, Deserializer, Serialize, Serializer, de};
use serde_json::Value;

use crate::Error;

#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Fingerprint([u8; blake3::OUT_LEN]);
impl Fingerprint {
	pub fn of(value: &Value) -> Self {
		let raw = canonical_json(value);

		Self(*blake3::hash(raw.as_bytes()).as_bytes())
	}

	pub fn to_hex(&self) -> String {
		blake3::Hash::from(self.0).to_hex().to_string()
	}
}
impl Display for Fingerprint {
	fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
		f.write_str(&self.to_hex())
	}
}
impl Debug for Fingerprint {
	fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
		write!(f, "Fingerprint({})", self.to_hex())
	}
}
impl FromStr for Fingerprint {
	type Err = Error;

	fn from_str(raw: &str) -> Result<Self, Self::Err> {
		blake3::Hash::from_hex(raw.trim())
			.map(|hash| Self(*hash.as_bytes()))
			.map_err(|_| Error::InvalidFingerprint { raw: raw.to_string() })
	}
}

macro_rules! fingerprint_id {
	($(#[$meta:meta])* $name:ident) => {
		$(#[$meta])*
		#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
		pub struct $name(Fingerprint);
		impl $name {
			pub fn of(value: &Value) -> Self {
				Self(Fingerprint::of(value))
			}

			pub fn fingerprint(&self) -> Fingerprint {
				self.0
			}
		}
		impl Display for $name {
			fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
				Display::fmt(&self.0, f)
			}
		}
		impl Debug for $name {
			fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
				write!(f, "{}({})", stringify!($name), self.0.to_hex())
			}
		}
		impl FromStr for $name {
			type Err = Error;

			fn from_str(raw: &str) -> Result<Self, Self::Err> {
				raw.parse().map(Self)
			}
		}
		impl Serialize for $name {
			fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
			where
				S: Serializer,
			{
				serializer.collect_str(&self.0)
			}
		}
		impl<'de> Deserialize<'de> for $name {
			fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
			where
				D: Deserializer<'de>,
			{
				let raw = String::deserialize(deserializer)?;

				raw.parse().map_err(de::Error::custom)
			}
		}
	};
}

fingerprint_id! {
	/// Identity of a registered filter, derived from its scope and normalized body.
	FilterId
}
fingerprint_id! {
	/// Identity of an AND-group of conditions.
	SubfilterId
}
fingerprint_id!(ConditionId);

/// Serializes a JSON value with object keys in sorted order.
pub fn canonical_json(value: &Value) -> String {
	let mut out = String::new();

	write_canonical(value, &mut out);

	out
}

fn write_canonical(value: &Value, out: &mut String) {
	match value {
		Value::Object(map) => {
			let mut entries = map.iter().collect::<Vec<_>>();

			entries.sort_by(|(lhs, _), (rhs, _)| lhs.cmp(rhs));
			out.push('{');

			for (position, (key, item)) in entries.into_iter().enumerate() {
				if position > 0 {
					out.push(',');
				}

				out.push_str(&Value::from(key.as_str()).to_string());
				out.push(':');
				write_canonical(item, out);
			}

			out.push('}');
		},
		Value::Array(items) => {
			out.push('[');

			for (position, item) in items.iter().enumerate() {
				if position > 0 {
					out.push(',');
				}

				write_canonical(item, out);
			}

			out.push(']');
		},
		scalar => out.push_str(&scalar.to_string()),
	}
}
