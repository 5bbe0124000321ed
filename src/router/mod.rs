//! Multi-node routing
//!
//! Each backend target (node) gets its own [`ApiChain`](crate::chain::ApiChain)
//! with its own credentials and allow-list. A [`Supervisor`] model picks the
//! node for a question and the [`Team`] dispatches to it. Unknown or malformed
//! supervisor output ends routing without calling any node.

pub mod supervisor;
pub mod team;

pub use supervisor::{parse_decision, RouteDecision, Supervisor, END};
pub use team::{RouteOutcome, RouterError, RouterMessage, RouterState, Team};
