//! Transport Module
//!
//! The multicast datagram socket and the receive worker that feeds the
//! process worker.
//!
//! ## Responsibilities
//! - **Socket setup**: bind the cluster port with address reuse and join the group.
//! - **Sending**: every datagram goes to the group address via [`socket::DatagramSink`].
//! - **Filtering**: decode, then drop foreign-secret, misaddressed and self-originated
//!   datagrams (trace-logged only).
//! - **Queueing**: hand accepted datagrams to the process worker over an unbounded channel.

pub mod receiver;
pub mod socket;
