//! # guisplit - GUI listener analysis and refactoring
//!
//! guisplit works on syntax models of GUI programs. It finds the *commands*
//! inside their event listeners (the code paths selected by `if`/`switch`
//! guards on the event), attributes each command to the widgets that trigger
//! it, and can split a shared listener into one listener per widget.
//!
//! ## Pipeline
//!
//! - [`tree`]: arena syntax tree read from the front-end's model files
//! - [`conditions`]: solves the guards of a command into boolean assignments
//! - [`command`] and [`extract`]: the command model and its segmentation
//! - [`dispatch`]: inlines local helper methods called by commands
//! - [`widgets`]: widget declarations and their usages
//! - [`finder`]: attributes commands to widgets
//! - [`refactor`]: moves each command into a listener of its own
//! - [`pipeline`]: runs the stages above over one [`model::AnalysisModel`]
//!
//! ## Example
//!
//! ```rust,ignore
//! use guisplit::{config::Config, model::AnalysisModel, pipeline::Pipeline};
//!
//! let mut model = AnalysisModel::from_file("app.json")?;
//! let report = Pipeline::from_config(&Config::default()).run(&mut model);
//! println!("{}", report);
//! ```

pub mod command;
pub mod conditions;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod extract;
pub mod finder;
pub mod model;
pub mod pipeline;
pub mod printer;
pub mod refactor;
pub mod toolkit;
pub mod tree;
pub mod widgets;

#[cfg(test)]
mod fixtures;
