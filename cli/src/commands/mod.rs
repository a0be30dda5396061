mod config;
mod helpers;
mod mirror;
mod recipes;

pub(crate) use config::cmd_config;
pub(crate) use helpers::mask;
pub(crate) use mirror::{cmd_mirror_resync, cmd_mirror_status};
pub(crate) use recipes::{cmd_edit, cmd_favorite, cmd_featured, cmd_saved, cmd_search, cmd_show};
