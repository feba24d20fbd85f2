// Subscription handles and repeating timers

mod handle;
mod timer;

pub use handle::SubscriptionHandle;
pub use timer::{ManualScheduler, Scheduler, TickCallback, TokioScheduler};
