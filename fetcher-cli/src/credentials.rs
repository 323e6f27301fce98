//! Credentials are read from the environment (optionally seeded from a
//! `.env` file). Storing them is somebody else's job.

use fetcher_core::{CredentialStore, Credentials};

/// `FETCHER_<KEY>_IDENTITY` and `FETCHER_<KEY>_SECRET`, key upper-cased.
pub fn env_names(key: &str) -> (String, String) {
    let key: String = key
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c.to_ascii_uppercase() } else { '_' })
        .collect();
    (format!("FETCHER_{key}_IDENTITY"), format!("FETCHER_{key}_SECRET"))
}

/// Collect credentials for `keys`; a key is present when its secret is set.
pub fn collect<'a>(
    keys: impl IntoIterator<Item = &'a str>,
    lookup: impl Fn(&str) -> Option<String>,
) -> CredentialStore {
    let mut store = CredentialStore::new();
    for key in keys {
        let (identity_var, secret_var) = env_names(key);
        if let Some(secret) = lookup(&secret_var) {
            let identity = lookup(&identity_var).unwrap_or_default();
            store.insert(key, Credentials::new(identity, secret));
        }
    }
    store
}

pub fn from_env<'a>(keys: impl IntoIterator<Item = &'a str>) -> CredentialStore {
    collect(keys, |name| std::env::var(name).ok().filter(|v| !v.is_empty()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_env_names() {
        let (id, secret) = env_names("interactive-brokers");
        assert_eq!(id, "FETCHER_INTERACTIVE_BROKERS_IDENTITY");
        assert_eq!(secret, "FETCHER_INTERACTIVE_BROKERS_SECRET");
    }

    #[test]
    fn test_collect_requires_secret() {
        let env: HashMap<&str, &str> = [
            ("FETCHER_DEGIRO_IDENTITY", "me"),
            ("FETCHER_DEGIRO_SECRET", "pw"),
            ("FETCHER_SCHWAB_IDENTITY", "me"),
            ("FETCHER_GMAIL_SECRET", "ya29.token"),
        ]
        .into_iter()
        .collect();
        let store = collect(["degiro", "schwab", "gmail"], |n| env.get(n).map(|v| v.to_string()));

        assert_eq!(store.get("degiro").unwrap().identity, "me");
        assert_eq!(store.get("degiro").unwrap().secret(), "pw");
        assert!(store.get("schwab").is_none());
        assert_eq!(store.get("gmail").unwrap().identity, "");
    }
}
