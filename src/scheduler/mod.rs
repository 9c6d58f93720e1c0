pub mod leases;
pub mod tasks;

pub use tasks::{spawn_task, ScheduledTask};
