//! Client for the Trellis type oracle.
//!
//! The oracle is a long-lived out-of-process service that holds the parsed
//! target project in memory and answers structural-type queries over a
//! private JSON-RPC channel on a loopback port. The compiler starts (or
//! attaches to) one oracle per compilation run and queries it once per
//! method; it never resolves types itself.
//!
//! The service source lives under `js/` in this crate; packaging it into a
//! distributable artifact is the build pipeline's job, not ours.

pub mod client;
pub mod protocol;

pub use client::{InputFiles, OracleClient, OracleConfig, TypeOracle};
pub use protocol::{MethodTypes, OracleError, QueryErrorKind};
