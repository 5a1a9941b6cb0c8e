// Windows platform implementations

#[cfg(target_os = "windows")]
pub mod dialog;

#[cfg(target_os = "windows")]
pub mod shell;
