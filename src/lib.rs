//! packdrop - add-on package installer and repair tool
//!
//! Downloads add-on packages for the game from their hosts (with mirror
//! fallback), extracts them into the game folder, and repairs the folder
//! when installs go wrong.

pub mod archive;
pub mod catalog;
pub mod downloaders;
pub mod game_finder;
pub mod installer;
pub mod paths;
pub mod repair;
pub mod settings;
pub mod system;

#[cfg(test)]
mod test_support;
