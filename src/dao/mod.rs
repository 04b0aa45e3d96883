/// Remote document store seam and its adapters.
pub mod competition_store;
/// Database model definitions.
pub mod models;
/// Durable key/value store scoped to one kiosk, holding the session identifier.
pub mod session_store;
/// Storage abstraction layer for database operations.
pub mod storage;
