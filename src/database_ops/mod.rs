pub mod db;
pub mod key_store;

pub use db::KeyDb;
pub use key_store::KeyStore;
