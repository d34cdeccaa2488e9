pub mod auth;
pub mod health;
pub mod menus;
pub mod policies;
