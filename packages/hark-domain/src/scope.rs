use std::fmt::{Display, Formatter};

use serde::{Deserialize, Serialize};

/// An isolated filter namespace: one collection of one index.
#[derive(Clone, Debug, Deserialize, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize)]
pub struct Scope {
	pub index: String,
	pub collection: String,
}
impl Scope {
	pub fn new(index: impl Into<String>, collection: impl Into<String>) -> Self {
		Self { index: index.into(), collection: collection.into() }
	}
}
impl Display for Scope {
	fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
		write!(f, "{}/{}", self.index, self.collection)
	}
}
