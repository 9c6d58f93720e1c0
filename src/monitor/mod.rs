pub mod tick;

pub use tick::{Monitor, MonitorConfig, MonitorStore};
