// Built-in transaction adapters

pub mod cache;
pub mod events;
pub mod persistence;
pub mod side_effect;

pub use cache::{CacheInvalidationAdapter, CacheKeyMapper};
pub use events::EventsAdapter;
pub use persistence::PersistenceAdapter;
pub use side_effect::SideEffectRetryAdapter;
