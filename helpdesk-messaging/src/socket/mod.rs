pub mod handlers;

pub use handlers::on_connect_with_state;
