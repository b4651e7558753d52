//! Asynchronous generation-job client.
//!
//! Submits jobs to the generation backend, tracks asynchronous jobs by
//! polling their status, and exposes the whole run as a cancellable
//! event stream ([`session::JobSession`]).

pub mod events;
pub mod http;
pub mod messages;
pub mod poller;
pub mod session;
pub mod submit;
pub mod upload;
