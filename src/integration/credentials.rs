//! Keyring helpers for the library password.

use keyring::Entry;

const LIBRARY_SERVICE_NAME: &str = "syncsonic.library";

fn library_entry(username: &str) -> Result<Entry, String> {
    Entry::new(LIBRARY_SERVICE_NAME, username)
        .map_err(|err| format!("failed to create keyring entry: {err}"))
}

/// Loads the library password stored for `username`, if any.
pub fn get_library_password(username: &str) -> Result<Option<String>, String> {
    let entry = library_entry(username)?;
    match entry.get_password() {
        Ok(password) => Ok(Some(password)),
        Err(keyring::Error::NoEntry) => Ok(None),
        Err(err) => Err(format!("failed to get keyring password: {err}")),
    }
}

/// Picks the configured password, falling back to the OS keyring.
pub fn resolve_library_password(
    username: &str,
    configured: Option<&str>,
) -> Result<String, String> {
    if let Some(password) = configured.filter(|password| !password.is_empty()) {
        return Ok(password.to_string());
    }
    get_library_password(username)?
        .ok_or_else(|| format!("no library password configured or stored for user '{username}'"))
}
