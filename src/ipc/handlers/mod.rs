pub mod admissions;
pub mod announcements;
pub mod backup_exchange;
pub mod core;
pub mod results;
pub mod routines;
pub mod students;
pub mod sync;
