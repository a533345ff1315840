pub mod name_index_repo;
pub mod user_repo;

pub use name_index_repo::NameIndexRepository;
pub use user_repo::UserRepository;
