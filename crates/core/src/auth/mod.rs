//! Token lifecycle: decoding, refresh and session teardown

pub mod events;
pub mod jwt;
pub mod token_manager;

pub use events::{LogoutNotifier, SubscriptionId};
pub use jwt::{decode_expiry, parse_access_token, TokenError};
pub use token_manager::TokenLifecycleManager;
