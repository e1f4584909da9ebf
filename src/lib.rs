//! Poker chip tracker: participants of a room record their bank and the
//! chips they have on the table, shared through a polled keyed store.

pub mod chips;
pub mod clipboard;
pub mod commands;
pub mod config;
pub mod console;
pub mod models;
pub mod participant;
pub mod render;
pub mod room;
pub mod session;
pub mod store;
pub mod sync;
