pub mod model;
pub mod settings;
pub mod time;
pub mod timer;
pub mod wearable;

pub use time::Clock;
