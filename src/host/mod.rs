//! Capabilities the host process hands to the gateway core.
//!
//! The core never talks to the radio stack, the process supervisor or the
//! device inventory directly; it goes through these traits so tests can
//! substitute their own implementations.

/// Device inventory exposed in the full-state snapshot
pub mod inventory;
/// Primary network interface lookup
pub mod network;
/// Radio network status and control
pub mod radio;
/// Process restart requests understood by the supervisor
pub mod supervisor;
