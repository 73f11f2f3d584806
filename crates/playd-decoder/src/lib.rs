pub mod config;
pub mod control;
pub mod decoder;
pub mod format;
pub mod input;
pub mod output;
pub mod pipe;
pub mod plugin;
pub mod plugins;
pub mod registry;
pub mod song;
pub mod thread;

#[cfg(test)]
pub(crate) mod testing;
