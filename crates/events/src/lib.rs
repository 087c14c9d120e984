//! `lectern-events`: identity-provider lifecycle notifications and the
//! subscription mechanics used to deliver them.

pub mod bus;
pub mod event;
pub mod in_memory_bus;

pub use bus::{NotificationBus, Subscription};
pub use event::{AuthEvent, AuthEventKind};
pub use in_memory_bus::{InMemoryBusError, InMemoryNotificationBus};
