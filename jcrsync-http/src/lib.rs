//! JcrSync HTTP Transport
//!
//! `reqwest`-based implementation of [`jcrsync_core::Transport`] for
//! Sling-based repositories.

pub mod client;
pub mod credentials;

pub use client::{DEFAULT_TIMEOUT, HttpTransport, parse_post_response};
pub use credentials::{CredentialProvider, Credentials, StaticCredentials};
