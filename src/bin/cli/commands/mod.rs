pub mod lists;
pub mod study;
pub mod sync;
