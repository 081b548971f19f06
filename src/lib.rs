//! # Sesame (Credential & Session Lifecycle)
//!
//! `sesame` owns the lifecycle of a user credential: registration, email
//! verification, login, password reset and session token refresh.
//!
//! ## Credentials
//!
//! Passwords are hashed with Argon2id. Login against an unknown email still
//! runs a verification against a decoy hash, so response time does not reveal
//! whether the account exists.
//!
//! ## Action Tokens
//!
//! Verification and reset links carry a random single-use token. Only its
//! SHA-256 digest is stored. Each account holds at most one live token per
//! purpose; issuing a new one replaces the old one.
//!
//! ## Session Tokens
//!
//! Access and refresh tokens are HS256 JWTs tagged with their kind. A refresh
//! token can only mint access tokens, and an access token is never accepted
//! where a refresh token is expected.
//!
//! ## Soft Deletes
//!
//! Deleted accounts keep their row but disappear from every lookup, and their
//! email and username become available again.

pub mod auth;
pub mod cli;
