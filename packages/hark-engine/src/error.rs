pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
	#[error("Not found: {message}")]
	NotFound { message: String },
	#[error("Malformed filter at {path}: {message}")]
	MalformedFilter { path: String, message: String },
	#[error("Invalid document: {message}")]
	InvalidDocument { message: String },
	#[error("Unknown keyword '{name}'.")]
	UnknownKeyword { name: String },
	#[error("Keyword {keyword} failed on field {field}: {message}")]
	Predicate { keyword: String, field: String, message: String },
	#[error("Invariant violation: {message}")]
	InvariantViolation { message: String },
	#[error("Scope {scope} is tainted by an earlier invariant violation.")]
	ScopeTainted { scope: String },
}
impl Error {
	pub(crate) fn invariant(message: impl Into<String>) -> Self {
		Self::InvariantViolation { message: message.into() }
	}
}

impl From<hark_domain::Error> for Error {
	fn from(err: hark_domain::Error) -> Self {
		match err {
			hark_domain::Error::Malformed { path, message } =>
				Self::MalformedFilter { path, message },
			hark_domain::Error::InvalidFingerprint { raw } =>
				Self::NotFound { message: format!("'{raw}' is not a valid filter id.") },
		}
	}
}
