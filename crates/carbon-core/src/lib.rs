//! Carbon coefficients from a land-cover grid and carbon-zone polygons.
//!
//! Stages, in order: [`overlay`] → [`resolve`] → [`rules`] → [`aggregate`] →
//! [`overrides`], with [`density`] painting the post-rule values back onto
//! the grid. [`pipeline::CarbonPipeline`] runs them end to end.

pub mod aggregate;
pub mod classes;
pub mod crs;
pub mod density;
pub mod error;
pub mod grid;
pub mod io;
pub mod lookup;
pub mod overlay;
pub mod overrides;
pub mod pipeline;
pub mod resolve;
pub mod rules;
pub mod zones;

pub use aggregate::{AggregatedRow, AggregationMethod};
pub use error::{CarbonError, Result, Stage};
pub use pipeline::{CarbonPipeline, InputPaths, OutputPaths, PipelineConfig, PipelineInputs, PipelineResult, RunSummary};
pub use resolve::CoefficientRow;
