pub mod clock;
pub mod engine;
pub mod environment;
pub mod store;
pub mod sync;

pub use engine::{AccountingConfig, AccountingHandle, ActivityAccounting};
pub use environment::{ActivityCallback, ActivityEnvironment, Subscription};
pub use store::ProfileStore;
pub use sync::FlushOutcome;
