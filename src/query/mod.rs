//! Querying across runs
//!
//! Queries are lazy and composable:
//!
//! ```text
//! Root ──filter()──▶ FilterView ──filter()──▶ FilterView
//!   │                    │
//!   └──group_by()──▶ [(GroupKey, FilterView)]
//!                        │
//!                        └──aggregate(key, Mean)──▶ Vec<f64> (one per step)
//! ```
//!
//! Nothing is materialized until uuids, configs or logs are asked for, and
//! every request re-evaluates against the current contents of the root.
//!
//! ## Example
//!
//! ```rust
//! use std::sync::Arc;
//! use trueno_track::query::Aggregation;
//! use trueno_track::root::{MemoryRoot, RunSet};
//! use trueno_track::run::Run;
//!
//! # fn main() -> trueno_track::Result<()> {
//! let root = Arc::new(MemoryRoot::new());
//! for (seed, lr) in [(0, 0.1), (1, 0.1), (2, 0.01)] {
//!     let mut run = Run::builder(root.clone())
//!         .config(&serde_json::json!({"lr": lr, "seed": seed}))
//!         .build();
//!     run.track([("loss", 1.0 / f64::from(seed + 1))], None)?;
//!     run.write()?;
//! }
//!
//! let groups = root.group_by("lr")?;
//! assert_eq!(groups.len(), 2);
//! let (key, view) = &groups[0];
//! assert_eq!(key.auto_label(), "lr=0.1");
//! assert_eq!(view.aggregate("loss", Aggregation::Mean)?, vec![0.75]);
//! # Ok(())
//! # }
//! ```

pub mod aggregate;
pub mod filter;
pub mod group;

pub use aggregate::Aggregation;
pub use filter::{Constraint, FilterView, Predicate};
pub use group::{GroupKey, GroupSpec};
