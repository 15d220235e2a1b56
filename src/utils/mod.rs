// Shared helpers
pub mod validation;
