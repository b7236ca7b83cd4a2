//! One-shot reminders: time phrase parsing, the pending store, and the
//! delivery loop.

pub mod parser;
pub mod scheduler;
pub mod store;

pub use parser::parse_fire_time;
pub use scheduler::ReminderScheduler;
pub use store::ReminderStore;
