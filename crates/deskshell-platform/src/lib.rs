pub mod dialog;
pub mod shell;
