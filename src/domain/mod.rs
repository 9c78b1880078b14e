// Domain layer: wire schemas and ports (interfaces).

pub mod model;
pub mod ports;
