/// Lowering backends.
///
/// Both translators take `&self` and keep per-call state in a local builder,
/// so one instance can be shared across threads behind an `Arc`.
pub mod es;
pub mod fields;
pub mod sql;

pub use es::EsTranslator;
pub use fields::{is_valid_field_name, resolve_field};
pub use sql::SqlTranslator;
