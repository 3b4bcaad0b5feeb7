// permitvault-common: document model and pure policies shared by the engine.

pub mod payload;
pub mod protocol;
pub mod section;
pub mod signature;
pub mod types;
pub mod validation;
