pub mod batch;
pub mod handlers;
pub mod middleware;
pub mod review;
pub mod routes;

pub use routes::create_router;
