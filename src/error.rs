use std::io::Error as IoError;

use crate::Checksum;

/// Errors surfaced by the cache, generic over the error type of the [crate::Decoder].
#[derive(Debug, thiserror::Error)]
pub enum SharingError<DecoderError: std::error::Error + 'static> {
    #[error("asset {checksum} not found in package {package}")]
    NotFound { checksum: Checksum, package: String },

    #[error("asset {name} declares an invalid size of {size} bytes")]
    InvalidSize { name: String, size: i64 },

    #[error("reading package {package}: {source}")]
    Io {
        package: String,
        #[source]
        source: IoError,
    },

    #[error("decoding asset {name}: {source}")]
    Decode {
        name: String,
        #[source]
        source: DecoderError,
    },

    #[error("the prefetch pipeline was already started")]
    AlreadyStarted,

    #[error("spawning a prefetch worker: {0}")]
    Spawn(#[source] IoError),
}

impl<E: std::error::Error + 'static> SharingError<E> {
    pub(crate) fn io(package: &crate::Package, source: IoError) -> Self {
        SharingError::Io {
            package: package.name().to_string(),
            source,
        }
    }
}
