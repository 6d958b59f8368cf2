pub mod exports;
pub mod health;
pub mod hooks;
pub mod jobs;
pub mod method;
pub mod settings;
