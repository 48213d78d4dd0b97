pub mod extract;
pub mod telegram_auth;
