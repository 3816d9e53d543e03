// Domain layer: wire-independent models and the transport port.

pub mod image;
pub mod model;
pub mod ports;
