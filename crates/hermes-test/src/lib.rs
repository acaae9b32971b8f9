//! # Hermes Test
//!
//! Accessories for testing Hermes services without a real auth backend:
//!
//! - [`AuthClientMock`] - an in-memory auth client with a fluent account
//!   builder for authentication, per-method authorization and
//!   impersonation permissions
//! - [`validate_params`] - one-line validation tests for params types
//!
//! ```
//! use hermes_test::AuthClientMock;
//!
//! let mock = AuthClientMock::new();
//! let alice = mock.new_account("alice-uuid");
//! let bob = mock.new_account("bob-uuid");
//! alice.authorized_all().can_impersonate(&[&bob]);
//! ```

#![warn(missing_docs)]
#![forbid(unsafe_code)]

mod auth;
mod validate;

pub use auth::{Account, AuthClientMock, MethodAccess, TestAccount};
pub use validate::{validate_params, validate_params_in};
