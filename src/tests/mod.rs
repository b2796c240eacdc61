#[cfg(test)]
pub mod common;

pub mod http_routes;
