pub mod backup;
pub mod classes;
pub mod core;
pub mod metrics;
pub mod records;
pub mod settings;
pub mod students;
pub mod sync;
