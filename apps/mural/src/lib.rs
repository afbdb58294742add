pub mod config;
pub mod coords;
pub mod surface;
pub mod sync;
pub mod transport;
pub mod world;
