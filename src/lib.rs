//! procstats core library: snapshot merging, process weighting and ranking
//! shared by the CLI and embedding viewers.

mod config;
mod duration;
mod error;
mod filter;
mod fsutil;
mod memstate;
mod merge;
mod model;
mod rank;
mod service;
mod session;
mod snapshot;
mod stats_cmd;
mod weight;

pub use config::*;
pub use duration::*;
pub use error::*;
pub use filter::*;
pub use fsutil::*;
pub use memstate::*;
pub use merge::*;
pub use model::*;
pub use rank::*;
pub use service::*;
pub use session::*;
pub use snapshot::*;
pub use stats_cmd::*;
pub use weight::*;
