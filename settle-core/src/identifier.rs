//! Composite resource identifiers
//!
//! Remote APIs often need several parameters to locate a resource (an
//! environment ID and a cluster name, say). Those parts are joined with a
//! single delimiter, the same for every resource type, and stored as the
//! resource's identifier.
//!
//! Parts must not contain the delimiter themselves. The codec does not check
//! or escape this: a part containing a comma produces an identifier that
//! decodes to the wrong number of parts.

use crate::error::{ErrorKind, ProviderError};

/// Separator between identifier parts
pub const DELIMITER: char = ',';

/// Join identifier parts
pub fn encode<S: AsRef<str>>(parts: &[S]) -> String {
    parts
        .iter()
        .map(AsRef::as_ref)
        .collect::<Vec<_>>()
        .join(&DELIMITER.to_string())
}

/// Split an identifier into exactly `expected` parts
pub fn decode(identifier: &str, expected: usize) -> Result<Vec<String>, ProviderError> {
    let parts: Vec<String> = identifier.split(DELIMITER).map(str::to_string).collect();

    if parts.len() != expected {
        return Err(ProviderError::new(ErrorKind::MalformedIdentifier {
            identifier: identifier.to_string(),
            expected,
            found: parts.len(),
        }));
    }

    Ok(parts)
}

/// Decode a two-part identifier
pub fn decode_pair(identifier: &str) -> Result<(String, String), ProviderError> {
    let [first, second] = decode_array::<2>(identifier)?;
    Ok((first, second))
}

/// Decode an identifier into a fixed-size array of parts
pub fn decode_array<const N: usize>(identifier: &str) -> Result<[String; N], ProviderError> {
    let parts = decode(identifier, N)?;
    parts.try_into().map_err(|parts: Vec<String>| {
        ProviderError::new(ErrorKind::MalformedIdentifier {
            identifier: identifier.to_string(),
            expected: N,
            found: parts.len(),
        })
    })
}
