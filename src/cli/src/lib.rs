//! cnb-assets CLI: create and inspect buildpack asset packages.

pub mod commands;
