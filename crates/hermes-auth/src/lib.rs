//! # Hermes Auth
//!
//! Identity resolution and impersonation for Hermes endpoints.
//!
//! Methods declare their access level through their arguments:
//!
//! - [`Public`] - the caller *may* be known; resolves identity lazily and
//!   memoizes the answer for the rest of the call
//! - [`Private`] - the caller *must* be authorized for the current method;
//!   providing it fails the call with *unauthorized* otherwise
//!
//! Both resolve through an application-supplied [`AuthClient`]. The
//! [`Impersonator`] opens a scope in which calls run as another account,
//! carrying the full chain of hops for the auth backend to police.

#![warn(missing_docs)]
#![forbid(unsafe_code)]

mod impersonate;
mod provider;

pub use impersonate::{Impersonated, Impersonator, ImpersonatorProvider};
pub use provider::{AuthClient, AuthProvider, Private, Public};
