pub mod mumble;
pub mod transport;
