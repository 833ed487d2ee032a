mod auth;
mod db;
mod error;
mod extractors;
mod handlers;
mod middleware;
mod router;
mod verification;

pub use router::app;
