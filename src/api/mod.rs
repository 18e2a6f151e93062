//! API endpoint modules.

pub mod health;
pub mod pipeline_button;
pub mod webhooks;

pub use health::configure_health_routes;
pub use pipeline_button::configure_routes as configure_button_routes;
pub use webhooks::configure_routes as configure_webhook_routes;
