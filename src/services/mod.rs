pub mod auth;
pub mod export;
pub mod qr_code;
pub mod render;
