pub mod allow_list_service;
pub mod session_service;
pub mod telegram_service;
