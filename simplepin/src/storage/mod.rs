mod token_storage;

pub use token_storage::{StorageError, TOKEN_ENV, TokenStorage, resolve_token, validate_token};
