//! A barebones client for the Noxa Music REST API.
#![deny(missing_docs)]

mod client;
pub use client::*;

mod song;
pub use song::*;

mod playlist;
pub use playlist::*;

mod search;
pub use search::*;

mod auth;
pub use auth::*;

mod download;
pub use download::*;

mod admin;
pub use admin::*;

mod library;
pub use library::*;

mod request;
