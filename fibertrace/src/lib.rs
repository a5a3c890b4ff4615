//! Fiber trace finding for multi-fiber spectrograph frames.
//!
//! Given a corrected 2D detector image (rows = spatial axis, columns =
//! dispersion axis) and the instrument's pseudo-slit box geometry, this
//! crate locates the illumination centerline of every fiber and models it
//! as a low-degree polynomial. The stages run strictly in order:
//!
//! 1. **Background estimate**: Otsu threshold over the inter-box gap rows
//!    of a narrow vertical cut ([`cut`]).
//! 2. **Peak detection**: local maxima of the cut profile with sub-pixel
//!    centroid refinement ([`peaks`]).
//! 3. **Box assignment and matching**: detected peaks are partitioned
//!    into fiber bundles and paired with the expected fiber slots,
//!    tolerating missing fibers; global fiber ids are folded across boxes
//!    deterministically ([`matching`]).
//! 4. **Trace following**: from each matched seed, walk the dispersion
//!    axis re-centering column by column ([`tracer`]).
//! 5. **Fitting**: least-squares polynomial per trajectory ([`fit`]),
//!    assembled into the output [`TraceMap`] ([`tracemap`]).
//!
//! Image preprocessing, configuration loading and serialization formats
//! are external collaborators; inputs arrive fully materialized in memory
//! and the output is a plain value object.
//!
//! # Example
//!
//! ```no_run
//! use std::collections::BTreeMap;
//! use fibertrace::{find_traces, BoxLayout, FiberBox, ModeThresholds, Observation, TraceParams};
//! use ndarray::Array2;
//!
//! let image: Array2<f64> = Array2::zeros((4112, 4096));
//! let layout = BoxLayout::new(
//!     vec![FiberBox { id: 1, nfibers: 62 }],
//!     vec![100.0, 500.0],
//! )?;
//! let observation = Observation {
//!     instrument: "MEGARA".to_string(),
//!     mode: "LR-V".to_string(),
//!     tags: BTreeMap::new(),
//! };
//! let map = find_traces(
//!     &image.view(),
//!     &layout,
//!     &ModeThresholds::default(),
//!     &observation,
//!     &TraceParams::new(2048),
//! )?;
//! assert_eq!(map.contents.len(), 62);
//! # Ok::<(), fibertrace::TraceError>(())
//! ```

pub mod config;
pub mod cut;
pub mod error;
pub mod fit;
pub mod matching;
pub mod peaks;
pub mod tracemap;
pub mod tracer;

pub use config::{BoxLayout, ConfigError, FiberBox, ModeThresholds, TraceParams};
pub use error::TraceError;
pub use matching::{FiberSeed, MatchError, SlotResolution};
pub use peaks::Peak;
pub use tracemap::{find_traces, GeometricTrace, Observation, TraceMap};
pub use tracer::{FollowParams, TraceSample, Trajectory};
