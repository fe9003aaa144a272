//! Chromium-backed implementation of the session-driver seam.
//!
//! [`CdpDriver`] drives a real browser over the Chrome DevTools Protocol;
//! [`FormAuthenticator`] runs a two-step username/password login through
//! any session driver.

pub mod auth;
pub mod cdp;

pub use auth::{FormAuthenticator, LoginSelectors};
pub use cdp::CdpDriver;
