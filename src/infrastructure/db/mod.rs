pub mod connection;
pub mod memory;
pub mod repository;
pub mod seed;
