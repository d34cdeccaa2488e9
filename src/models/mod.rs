pub mod identity;
pub mod menu;
