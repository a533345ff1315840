pub mod collaborators;
pub mod domain;
pub mod repository;
pub mod service;
pub mod store;

pub use collaborators::{MessageSender, Notifier, PasswordVerifier};
pub use store::KeyValueStore;
