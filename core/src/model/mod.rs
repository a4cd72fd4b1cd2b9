pub mod activity;
pub mod actor;
pub mod nodeinfo;
pub mod subscription;

pub use activity::{Activity, ActivityType};
pub use actor::Actor;
pub use subscription::{PendingFollow, PendingKind, RelayToggles, Subscription, SubscriptionInfo, Toggle};
