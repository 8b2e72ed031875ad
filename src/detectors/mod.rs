//! Divergence detection components
//!
//! - **stats**: rolling CVD-delta spread, price-move ATR proxy, volume average
//! - **swing**: causal pivot detection into an alternating swing sequence
//! - **trigger**: volume surge gate
//! - **divergence**: swing-pair pattern classification and scoring
//! - **resolver**: tier/score resolution of buy vs sell candidates

pub mod helpers;

pub mod divergence;
pub mod resolver;
pub mod stats;
pub mod swing;
pub mod trigger;

pub use divergence::{DivergenceCandidate, DivergenceScanner, Grade, Pattern, Rejection};
pub use resolver::{best_for_side, rank, resolve, resolve_candidates};
pub use stats::{RollingStats, RollingWindow};
pub use swing::{PivotBar, Swing, SwingKind, SwingTracker, SwingUpdate};
pub use trigger::{fires, volume_ratio, VolumeTrigger};
