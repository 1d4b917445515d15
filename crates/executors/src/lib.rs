pub mod command;
pub mod stages;
