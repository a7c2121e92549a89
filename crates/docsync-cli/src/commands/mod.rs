pub mod format;
pub mod sources;
pub mod sync;
pub mod versions;
