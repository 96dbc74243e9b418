pub mod debounce;
pub mod dispatch;
pub mod editor;
pub mod history;
pub mod injector;
pub mod keyboard;
pub mod keymap;
pub mod model;
pub mod normalize;

#[cfg(feature = "wayland")]
pub mod protocols;
pub mod sim;
