//! Session credential storage.
//!
//! The device issues session cookies on login. `SessionStore` keeps the
//! current cookie set in memory and mirrors it to a single cache file so a
//! later process invocation can reuse the session instead of logging in
//! again. A missing or corrupt cache file is never an error; it just means
//! "no session" and the client logs in.

pub mod session;

pub use session::SessionStore;
