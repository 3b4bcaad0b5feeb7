// Section-level policies: lock resolution on signed documents and repair
// of duplicated section/field identities.

pub mod dedup;
pub mod lock;
