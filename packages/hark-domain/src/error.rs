pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum Error {
	#[error("{path}: {message}")]
	Malformed { path: String, message: String },
	#[error("Invalid fingerprint '{raw}'.")]
	InvalidFingerprint { raw: String },
}
impl Error {
	pub(crate) fn malformed(path: impl Into<String>, message: impl Into<String>) -> Self {
		Self::Malformed { path: path.into(), message: message.into() }
	}
}
