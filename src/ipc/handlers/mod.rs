pub mod catalog;
pub mod core;
pub mod deploy;
pub mod editor;
pub mod routine;
pub mod timetable;
