pub mod boxes;
pub mod health;
pub mod notifications;
