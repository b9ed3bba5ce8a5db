//! An OAuth2-style authorization server.
//!
//! Registered apps obtain delegated access to a user's profile through the
//! authorization-code flow: the user consents, the app exchanges a
//! single-use code for an access token, and presents that token to resolve
//! the profile. Administrators approve apps and revoke access.

pub mod api;
pub mod config;
pub mod entity;
pub mod error;
pub mod oauth2;
