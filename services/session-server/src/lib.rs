pub mod broadcaster;
pub mod client;
pub mod config;
pub mod model;
pub mod persistence;
pub mod reconcile;
pub mod registry;
pub mod reorder;
pub mod session;
pub mod upstream;

/// Largest integer a JS `Number` can hold without losing precision —
/// `my_queue_id` travels through client JSON as a plain number, so it must
/// stay inside this range to round-trip (spec §3's "opaque integer" note).
const MAX_SAFE_JS_INTEGER: u64 = (1u64 << 53) - 1;

/// A fresh, JS-float-safe random queue id.
pub fn random_queue_id() -> u64 {
    rand::random::<u64>() % (MAX_SAFE_JS_INTEGER + 1)
}
