pub mod app;
pub mod config;
pub mod editor;
pub mod events;
pub mod library;
pub mod preferences;
pub mod reachability;
pub mod session;
pub mod storage;
pub mod sync;

#[cfg(test)]
mod test_support;
