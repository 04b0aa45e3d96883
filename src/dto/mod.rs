pub mod competition;
pub mod health;
pub mod sse;
pub mod validation;
