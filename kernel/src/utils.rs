//! Various utility functions/macros used throughout the kernel
use std::path::PathBuf;
use std::time::{SystemTime, UNIX_EPOCH};

use url::Url;

use crate::{Error, TableResult};

/// convenient way to return an error if a condition isn't true
macro_rules! require {
    ( $cond:expr, $err:expr ) => {
        if !($cond) {
            return Err($err);
        }
    };
}

pub(crate) use require;

/// Milliseconds since the unix epoch.
pub(crate) fn current_time_ms() -> TableResult<i64> {
    let duration = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_err(|e| Error::generic(format!("System clock is before the unix epoch: {e}")))?;
    i64::try_from(duration.as_millis())
        .map_err(|_| Error::generic("Current time in milliseconds does not fit into an i64"))
}

/// Parse a table location into a directory-like [`Url`] (always ends with `/`).
///
/// Anything with a scheme (`s3://`, `memory:///`, `file:///`, ...) is parsed as-is. Everything
/// else is treated as a local filesystem path; relative paths are resolved against the current
/// working directory. Unlike a read, a write may target a path that does not exist yet, so the
/// path is not required to exist.
pub fn try_parse_uri(uri: impl AsRef<str>) -> TableResult<Url> {
    let uri = uri.as_ref();
    require!(
        !uri.trim().is_empty(),
        Error::invalid_table_location("table location must not be empty")
    );
    let url = match Url::parse(uri) {
        // a single letter scheme is a windows drive letter, not a url
        Ok(url) if url.scheme().len() > 1 => url,
        Ok(_) | Err(url::ParseError::RelativeUrlWithoutBase) => local_path_to_url(uri)?,
        Err(e) => return Err(e.into()),
    };
    Ok(ensure_trailing_slash(url))
}

fn local_path_to_url(path: &str) -> TableResult<Url> {
    let path = PathBuf::from(path);
    let path = if path.is_absolute() {
        path
    } else {
        std::env::current_dir()
            .map_err(|e| Error::invalid_table_location(format!("{path:?}: {e}")))?
            .join(path)
    };
    Url::from_directory_path(&path)
        .map_err(|_| Error::invalid_table_location(format!("Invalid local path: {path:?}")))
}

pub(crate) fn ensure_trailing_slash(mut url: Url) -> Url {
    if !url.path().ends_with('/') {
        let path = format!("{}/", url.path());
        url.set_path(&path);
    }
    url
}
