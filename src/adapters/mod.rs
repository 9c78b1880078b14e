// Adapters layer: concrete implementations for external systems (http client, processes).

pub mod rest_client;
pub mod simulton_proxy;
