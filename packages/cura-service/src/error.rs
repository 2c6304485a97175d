pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
	#[error("Invalid request: {message}")]
	InvalidRequest { message: String },
	#[error("Embedding unavailable: {message}")]
	EmbeddingUnavailable { message: String },
	#[error("Source {source_name} failed: {message}")]
	Source { source_name: String, message: String },
	#[error("Provider error: {message}")]
	Provider { message: String },
	#[error("Storage error: {message}")]
	Storage { message: String },
}
impl From<cura_storage::Error> for Error {
	fn from(err: cura_storage::Error) -> Self {
		match err {
			cura_storage::Error::InvalidArgument(message) => Self::InvalidRequest { message },
			other => Self::Storage { message: other.to_string() },
		}
	}
}

impl From<cura_providers::Error> for Error {
	fn from(err: cura_providers::Error) -> Self {
		Self::Provider { message: err.to_string() }
	}
}
