// Export coordinator: per-entity delivery policy, subscriptions and batch timers

mod capture;
mod coordinator;
mod dispatch;
mod entity;

pub use capture::DOMAIN_ATTRIBUTES;
pub use coordinator::{CaptureOptions, ExportCoordinator, ListenerId, ModeListener};
pub use entity::{EntityConfig, ExportMapping, ExportMode};
