//! Export a Tavern Keeper account to local JSON files.
//!
//! - [`client`]: throttled API client that merges paginated responses
//! - [`export`]: traversal of messages, characters and campaigns
//! - [`storage`]: timestamped files below the export root
//! - [`document`]: checked access to schema-less API documents
//! - [`config`]: layered settings

pub mod client;
pub mod config;
pub mod document;
pub mod export;
pub mod storage;
