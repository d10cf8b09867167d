//! Receive an rtp over udp stream (typically multicast), reorder its
//! packets by sequence number and reassemble the marker-delimited
//! frames.
//!
//! The pipeline has two stages: the datagram source parses each
//! received datagram on the receive task and pushes it into a reception
//! queue; a dedicated sequencing worker pulls packets out of that queue
//! in sequence number order, declaring a sequence number lost when the
//! queue fills up without it, and appends them to the sequenced queue
//! that the consumer api drains.
//!
//! Frames can be consumed one by one with
//! [`Listener::next_frame`], or as a continuous byte stream through
//! [`Listener::stream`]. Everything the engine drops along the way is
//! reported through the [`Observer`] trait.

pub mod config;
mod error;
mod listener;
pub mod observer;
mod sequencer;
pub mod source;
pub mod statistics;
mod stream;
mod uri;

pub use self::{
    config::{Config, StreamConfig},
    error::{Error, Result},
    listener::Listener,
    observer::Observer,
    source::{Datagram, UdpSource},
    statistics::Counts,
    stream::FrameStream,
    uri::Uri,
};

pub use rtp::{Header, Packet};
