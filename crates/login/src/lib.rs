//! Login bridge for gogrepo.
//!
//! gogrepo's `login` subcommand is interactive: it prompts for a username,
//! a password and, for accounts with two-factor authentication, a code
//! that arrives out of band. [`LoginBridge`] splits that conversation into
//! two calls so a UI can collect the code between them.
//!
//! ```text
//! Unauthenticated ──credentials──▶ AwaitingSecondFactor ──code──▶ Authenticated
//!        │                                  │
//!        └──────────(rejected)──────────────┴──────────────────▶ Failed
//! ```

mod bridge;
mod error;
mod expect;
mod prompts;
mod session;

pub use bridge::{COOKIES_FILE, LoginBridge, LoginTimeouts};
pub use error::LoginError;
pub use prompts::LoginPrompts;
pub use session::{LoginState, LoginStatus, Stage};
