//! # Quiz Session Server Library
//!
//! This library provides the live session orchestrator for a real-time
//! multiplayer quiz. It is the single authority over session state: who is in
//! a session, which question is open, what everyone has scored, and when each
//! question's countdown runs out.
//!
//! ## Core Responsibilities
//!
//! ### Session Lifecycle
//! Sessions are created lazily from an external authoring store the first
//! time their code is used, run through an admin-driven question sequence,
//! and are removed a grace period after they end.
//!
//! ### Scoring Authority
//! Answers are scored server-side from the submitted option and remaining
//! time; the first submission per player per question wins and later ones
//! are discarded. Clients only ever see the results.
//!
//! ### Broadcast Fan-out
//! Every scoring event, roster change, and question transition is pushed to
//! the session's room so all participants render the same state.
//!
//! ## Architecture Design
//!
//! ### Single-Threaded Event Loop
//! All session mutation happens sequentially on one event loop. Inbound
//! packets, question deadlines, and expiry timers all arrive as messages on
//! the same channel, which eliminates lock ordering and interleaving bugs by
//! construction.
//!
//! ### UDP-Based Communication
//! Uses UDP sockets with bincode-serialized packets. The transport has no
//! connection teardown, so liveness is tracked explicitly: a connection that
//! stays silent past the timeout is swept out as a disconnect.
//!
//! ### Cancellable Deadlines
//! Each open question arms a countdown task. An admin advancing early
//! replaces the pending deadline, and a deadline that fires late is
//! recognized by its question index and dropped.
//!
//! ## Module Organization
//!
//! - `registry`: the session map and lazy creation from the authoring store
//! - `session`: one session's roster, question cursor, and answer log
//! - `leaderboard`: ranked projections of a session roster
//! - `scheduler`: question deadline and session expiry timers
//! - `connections`: socket-address-to-session bindings and timeouts
//! - `store`: quiz catalog backends
//! - `network`: UDP transport, packet routing, and the main loop

pub mod connections;
pub mod leaderboard;
pub mod network;
pub mod registry;
pub mod scheduler;
pub mod session;
pub mod store;
