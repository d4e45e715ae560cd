pub mod check;
pub mod common;
pub mod drain;
pub mod history;
pub mod maintain;
pub mod run;
pub mod status;
pub mod summary;
