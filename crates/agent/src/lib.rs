//! The turn loop — the heart of mcplink.
//!
//! A turn follows a **Ask → Act → Observe** cycle:
//!
//! 1. **Receive** a line from the operator
//! 2. **Send** the whole conversation plus the tool catalog to the model
//! 3. **If tool calls**: dispatch them to the tool server, append results, loop back to step 2
//! 4. **If text response**: that is the turn's answer
//!
//! The loop continues until the model responds with text only or the round
//! cap is reached.

pub mod catalog;
pub mod dispatcher;
pub mod loop_runner;
pub mod session;

pub use dispatcher::ToolDispatcher;
pub use loop_runner::{AgentLoop, TurnOutcome, TurnState};
pub use session::Session;
