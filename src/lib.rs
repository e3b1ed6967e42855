//! Keeps OpenSubsonic playlists in step with playlists from a metadata provider.

pub mod app_runtime;
pub mod backends;
pub mod cache;
pub mod catalog;
pub mod codes;
pub mod config;
pub mod db_manager;
pub mod drift;
pub mod error;
pub mod integration;
pub mod library_search;
pub mod matcher;
pub mod metadata_lookup;
pub mod model;
pub mod provider;
pub mod reconciler;
pub mod text_match;
pub mod throttle;

#[cfg(test)]
mod test_support;
