pub mod forwarded;
pub mod handlers;
pub mod models;
pub mod routes;
mod views;

pub use routes::create_router;
