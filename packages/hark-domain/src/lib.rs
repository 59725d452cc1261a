pub mod document;
pub mod eval;
pub mod expr;
pub mod fingerprint;
pub mod normalize;
pub mod scope;

mod error;

pub use error::{Error, Result};
pub use expr::{Clause, FilterExpr};
pub use fingerprint::{ConditionId, FilterId, Fingerprint, SubfilterId};
pub use normalize::NormalizedFilter;
pub use scope::Scope;
