//! Optical Entropy Block Lifecycle
//!
//! Turns a stream of camera-noise entropy into a sequence of delivered
//! blocks. A session polls a bit extractor and a block collector, surfaces
//! quality statistics, renders a random walk over every drained block for
//! visual audit, and routes each finished block to a relay or to local
//! export files.
//!
//! # Architecture
//!
//! ```text
//! capture → extraction → collection ─┐
//!                                    ▼
//!              session (controller + runner) → delivery (relay | export)
//!                  │            │
//!              analysis        walk
//! ```
//!
//! # Design Principles
//!
//! - **One coordination context**: all session state changes happen on the
//!   runner task; deliveries report back rather than mutate
//! - **One block in flight**: readiness observed during a delivery is queued
//! - **Soft delivery failures**: a failed send never crashes a session
//! - **Advisory statistics**: chi-square warns, it never rejects a block
//!
//! # Example
//!
//! ```no_run
//! use optical_entropy_blocks::{
//!     capture::{CaptureConfig, MockCamera},
//!     collection::CollectorConfig,
//!     config::SessionConfig,
//!     delivery::{DirectoryExportSink, Sinks},
//!     session::{BlockLifecycleController, SessionRunner},
//! };
//! use std::sync::Arc;
//! use tokio::sync::{mpsc, watch};
//!
//! # async fn demo() -> Result<(), Box<dyn std::error::Error>> {
//! let sinks = Sinks::local(Arc::new(DirectoryExportSink::new("blocks")));
//! let controller = BlockLifecycleController::new(SessionConfig::default(), sinks)?;
//!
//! let (events_tx, _events_rx) = mpsc::unbounded_channel();
//! let (_close_tx, close_rx) = watch::channel(false);
//! let runner = SessionRunner::new(
//!     controller,
//!     Box::new(MockCamera::new()),
//!     CaptureConfig::default(),
//!     CollectorConfig::default(),
//!     events_tx,
//! );
//! let summary = runner.run(close_rx).await;
//! println!("{} blocks", summary.blocks);
//! # Ok(())
//! # }
//! ```

#![warn(rust_2018_idioms)]
#![deny(unsafe_code)]

pub mod analysis;
pub mod capture;
pub mod collection;
pub mod config;
pub mod delivery;
pub mod extraction;
pub mod metrics;
pub mod session;
pub mod walk;

// Re-export commonly used types at crate root
pub use analysis::{QualityMonitor, QualitySample};
pub use capture::{CaptureConfig, Frame, FrameSource, MockCamera};
pub use collection::{BlockCollector, Collector, CollectorConfig};
pub use config::{BlockTarget, ConfigError, DeliveryMode, FileConfig, SessionConfig};
pub use delivery::{DeliveryError, DeliveryResult, DeliveryRouter, Sinks};
pub use extraction::{Extractor, FrameExtractor};
pub use session::{
    Block, BlockLifecycleController, LifecycleState, SessionError, SessionEvent, SessionRunner,
};
pub use walk::{WalkPoint, WalkTransform};

/// Library version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
