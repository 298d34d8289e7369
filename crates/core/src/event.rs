use chrono::{DateTime, Utc};

/// Metadata every domain event exposes for logging and routing.
pub trait Event {
    /// Stable, dotted name (e.g. `products.product.category_added`).
    fn event_type(&self) -> &'static str;

    /// Schema version of the event payload.
    fn version(&self) -> u32;

    fn occurred_at(&self) -> DateTime<Utc>;
}
