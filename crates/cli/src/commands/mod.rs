pub mod configure;
pub mod health;
pub mod prioritize;
