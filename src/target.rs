//! Target resolution
//! Turns the sub-path after the mount prefix into an absolute upstream URL

use crate::error::InputError;

/// Prefix used when the sub-path is a bare hostname
const BARE_HOST_PREFIX: &str = "https://www.";

/// Resolve a sub-path into the URL to forward to.
///
/// A sub-path already starting with `http` (so `http://` or `https://`) is
/// used verbatim; anything else is treated as a bare hostname and becomes
/// `https://www.<sub_path>`. Only emptiness is checked here, a malformed host
/// fails later when the request is built or sent.
pub fn resolve(sub_path: &str) -> Result<String, InputError> {
    if sub_path.is_empty() {
        return Err(InputError::MissingTarget);
    }

    if sub_path.starts_with("http") {
        Ok(sub_path.to_string())
    } else {
        Ok(format!("{}{}", BARE_HOST_PREFIX, sub_path))
    }
}
