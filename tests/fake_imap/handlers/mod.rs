//! IMAP command handlers for the fake server.
//!
//! Only the commands a count check needs: LOGIN, STATUS, LOGOUT.


pub use login::handle_login;
pub use logout::handle_logout;
pub use status::handle_status;
