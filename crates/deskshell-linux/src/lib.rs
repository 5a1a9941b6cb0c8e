// Unix platform implementations

#[cfg(unix)]
pub mod dialog;

#[cfg(unix)]
pub mod shell;
