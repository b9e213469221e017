// Domain layer: port model and the seams to the host (transport, chooser).

pub mod model;
pub mod ports;
