//! Transport DTOs and route paths shared by the server and the CLI.

pub mod routes;
pub mod types;
