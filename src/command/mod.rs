//! Command Channel between the control plane and agents
//!
//! Outbound commands are addressed: every [`AgentCommand`](crate::AgentCommand) carries the
//! id of the host it targets and waits in that host's FIFO until the host's next heartbeat
//! drains it. Results flow back through an unbounded mpsc channel consumed by the
//! result processor actor.
//!
//! ```text
//! Registry ──send()──► [host 1 FIFO] ──take_for_host(1)──► heartbeat response ──► agent 1
//!                      [host 2 FIFO] ──take_for_host(2)──► heartbeat response ──► agent 2
//!
//! agent ──command-result──► ResultSender ──► ResultProcessor ──► Registry
//! ```

pub mod channel;
pub mod ids;

pub use channel::{CommandChannel, CommandSender, ResultReceiver, ResultSender, result_channel};
pub use ids::CommandIdGenerator;
