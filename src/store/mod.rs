//! Ownership-scoped row access for profiles, sessions and messages.
//!
//! Every session and message query filters on `user_id`, so a row owned by
//! another user is indistinguishable from a missing one.

pub mod messages;
pub mod profiles;
pub mod sessions;

pub use messages::{create_message, list_messages};
pub use profiles::{ensure_profile, find_profile_by_email, get_profile, update_profile};
pub use sessions::{
    create_session, delete_session, get_session, list_sessions, update_session_title,
};
