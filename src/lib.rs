//! # Trueno-Track: Step-Indexed Experiment Tracking
//!
//! **Version**: 0.1.0
//!
//! Trueno-Track records what a training job did, one step-row at a time, and
//! lets you query across many recorded jobs afterwards.
//!
//! ## Architecture
//!
//! ```text
//! Run ──track()──▶ step-rows ──write()──▶ Root (MemoryRoot | DirRoot)
//!                                            │
//!                 filter() / group_by() ◀────┘
//!                        │
//!                        └──▶ aggregate(key, Mean | Median | ...) ──▶ Vec<f64>
//! ```
//!
//! - [`run`]: a live run: log, config snapshot, info block
//! - [`root`]: the storage contract and its in-memory and directory adapters
//! - [`query`]: lazy filtered views, grouping, step-wise aggregation
//! - [`value`] / [`tensor`]: what can be tracked and how it is stored
//!
//! ## Example Usage
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use trueno_track::query::Aggregation;
//! use trueno_track::root::{DirRoot, RunSet};
//! use trueno_track::run::Run;
//!
//! # fn main() -> trueno_track::Result<()> {
//! let root = Arc::new(DirRoot::discover()?);
//!
//! let mut run = Run::builder(root.clone())
//!     .experiment("mnist")
//!     .config(&serde_json::json!({"lr": 0.01, "optimizer": "adam"}))
//!     .build();
//! for epoch in 0..10 {
//!     let loss = 1.0 / f64::from(epoch + 1);
//!     run.track([("loss", loss)], None)?;
//! }
//! run.write()?;
//!
//! for (key, runs) in root.filter().constraint("optimizer", "adam").group_by("lr")? {
//!     println!("{key}: {:?}", runs.aggregate("loss", Aggregation::Median)?);
//! }
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

pub mod codec;
pub mod config;
pub mod error;
pub mod query;
pub mod root;
pub mod run;
pub mod tensor;
pub mod value;

pub use config::{Config, ConfigSource};
pub use error::{Error, Result};
pub use query::{Aggregation, Constraint, FilterView, GroupKey, GroupSpec};
pub use root::{DirRoot, MemoryRoot, Root, RunData, RunSet};
pub use run::{Run, RunInfo};
pub use tensor::Tensor;
pub use value::{Trackable, Value};
