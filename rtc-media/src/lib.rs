#![warn(rust_2018_idioms)]

//! Receive-side media path: the packet records exchanged with the quality
//! analyzer and an adaptive audio jitter buffer.
//!
//! The jitter buffer is invoked synchronously from whatever thread owns the
//! playout cadence: [`JitterBuffer::add`](audio::JitterBuffer::add) for every
//! packet handed over by the transport, and
//! [`JitterBuffer::get`](audio::JitterBuffer::get) once per packetization
//! interval. Every decision it takes about a packet is reported through an
//! [`RxStatusReporter`](reporter::RxStatusReporter).

pub mod audio;
pub mod codec;
pub mod packet;
pub mod reporter;
