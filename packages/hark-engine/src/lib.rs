//! Real-time filter matching: a deduplicated filter graph per scope, with reference-counted
//! removal and short-circuit matching.

pub mod engine;
pub mod graph;
pub mod keywords;
pub mod matcher;
pub mod operand_index;
pub mod registrar;
pub mod remover;

mod error;

pub use engine::{Document, Engine, FilterInfo, Registration};
pub use error::{Error, Result};
pub use graph::{GraphStats, ScopeGraph};
pub use keywords::{Keyword, KeywordRegistry, KeywordResult, OperandStore};
pub use registrar::StoreOutcome;
