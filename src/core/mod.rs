pub mod collectors;
pub mod executor;
pub mod handlers;
pub mod metric;
