pub mod qr_code;
pub mod template;
pub mod user;
