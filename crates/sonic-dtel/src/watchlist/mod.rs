//! DTEL watchlist - the ACL-like rule set selecting which packets
//! trigger telemetry.
//!
//! Rules are grouped per direction and bind point and kept sorted by
//! precedence; [`Watchlist::classify`] is a linear scan of the compiled
//! groups, narrowest scope first.

mod rule;
mod table;

pub use rule::{L4PortMatch, MatchKey, WatchRule};
pub use table::{Classification, Watchlist};
