//! Client events - what a gateway connection reports to its consumers

mod client_event;

pub use client_event::{
    ClientEvent, CloseFrame, DisconnectEvent, DispatchEvent, ReadyEvent, ShutdownEvent,
};
