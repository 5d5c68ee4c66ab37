//! Wire types shared by the scheduler (producer) and the gateway (consumer).
//!
//! Status flows in two hops:
//!
//! 1. The scheduling engine emits [`status::StatusEvent`]s, lowered onto two
//!    queues of [`status::ChanMsg`] (success output, error output).
//! 2. Viewer sessions coalesce those into [`viewer::WsMsg`] lists and push
//!    them to every browser as a JSON array.

pub mod actions;
pub mod status;
pub mod viewer;
