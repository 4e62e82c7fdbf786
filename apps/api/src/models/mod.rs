pub mod account;
pub mod application;
pub mod chat;
pub mod vacancy;
