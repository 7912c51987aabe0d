// Cognito Auth - Library root

pub mod auth;
pub mod config;
pub mod error;
pub mod http_client;
