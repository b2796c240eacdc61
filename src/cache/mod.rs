pub mod policy;
pub mod session;

pub use policy::{CacheDecision, CachePolicy, RefetchReason};
pub use session::{CachedSession, Record};
