pub mod admin;
pub mod postgres_client;
pub mod sql;
