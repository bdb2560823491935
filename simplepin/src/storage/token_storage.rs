use keyring::Entry;
use thiserror::Error;

const SERVICE_NAME: &str = "simplepin";
const TOKEN_KEY: &str = "pinboard_token";
pub const TOKEN_ENV: &str = "SIMPLEPIN_TOKEN";

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("keyring error: {0}")]
    KeyringError(#[from] keyring::Error),
    #[error("token not found")]
    TokenNotFound,
    #[error("api token must look like username:TOKEN")]
    InvalidToken,
}

/// The Pinboard API token, kept in the OS keyring.
pub struct TokenStorage {
    entry: Entry,
}

impl TokenStorage {
    pub fn new() -> Result<Self, StorageError> {
        Ok(Self {
            entry: Entry::new(SERVICE_NAME, TOKEN_KEY)?,
        })
    }

    pub fn save_token(&self, token: &str) -> Result<(), StorageError> {
        let token = validate_token(token)?;
        self.entry.set_password(token)?;
        Ok(())
    }

    pub fn get_token(&self) -> Result<String, StorageError> {
        match self.entry.get_password() {
            Ok(token) => Ok(token),
            Err(keyring::Error::NoEntry) => Err(StorageError::TokenNotFound),
            Err(err) => Err(StorageError::KeyringError(err)),
        }
    }

    pub fn delete_token(&self) -> Result<(), StorageError> {
        match self.entry.delete_credential() {
            Ok(()) | Err(keyring::Error::NoEntry) => Ok(()),
            Err(err) => Err(StorageError::KeyringError(err)),
        }
    }

    pub fn has_token(&self) -> bool {
        self.entry.get_password().is_ok()
    }
}

/// Accepts `username:HEX` as shown on the Pinboard settings page.
pub fn validate_token(token: &str) -> Result<&str, StorageError> {
    let token = token.trim();
    match token.split_once(':') {
        Some((user, secret))
            if !user.is_empty()
                && !secret.is_empty()
                && !secret.contains(':')
                && !token.chars().any(char::is_whitespace) =>
        {
            Ok(token)
        }
        _ => Err(StorageError::InvalidToken),
    }
}

/// A token from the environment wins over the stored one.
pub fn resolve_token<F>(from_env: Option<String>, stored: F) -> Result<String, StorageError>
where
    F: FnOnce() -> Result<String, StorageError>,
{
    if let Some(token) = from_env.filter(|token| !token.trim().is_empty()) {
        return validate_token(&token).map(str::to_string);
    }
    stored()
}
