pub mod accounts;
pub mod assistant;
pub mod auth;
pub mod employees;
pub mod import;
pub mod lookups;
pub mod schema;
pub mod seed;
pub mod store;
