//! Traffic descriptors handed from a worker process to its successor.
//!
//! A successor reads one length-delimited [`TrafficSet`] from stdin: the
//! listening sockets it inherits (already duplicated onto its descriptor
//! table) and the predecessor's worker store. A process started without a
//! predecessor reads nothing.

use std::io::{self, Read};

use prost::Message;
use thiserror::Error;

use guild_config::{SocketEndpoint, SocketParseError};

/// One inherited listening socket.
#[derive(Clone, PartialEq, Eq, ::prost::Message)]
pub struct Traffic {
    /// Descriptor number in the receiving process.
    #[prost(uint64, tag = "1")]
    pub fd: u64,
    /// Configured address of the listener.
    #[prost(string, tag = "2")]
    pub addr: String,
    /// Network family, `tcp` or `unix`.
    #[prost(string, tag = "3")]
    pub network: String,
}

/// Everything a successor inherits.
#[derive(Clone, PartialEq, Eq, ::prost::Message)]
pub struct TrafficSet {
    /// Inherited listeners.
    #[prost(message, repeated, tag = "1")]
    pub traffic: Vec<Traffic>,
    /// Serialised worker store of the predecessor.
    #[prost(bytes = "vec", tag = "2")]
    pub worker_store: Vec<u8>,
}

/// Errors raised while decoding inherited traffic.
#[derive(Debug, Error)]
pub enum TrafficError {
    /// Reading stdin failed.
    #[error("failed to read traffic descriptors: {source}")]
    Read {
        /// Underlying I/O error.
        #[source]
        source: io::Error,
    },
    /// The descriptor stream is malformed.
    #[error("malformed traffic descriptors: {source}")]
    Decode {
        /// Decoder error.
        #[source]
        source: prost::DecodeError,
    },
    /// A descriptor names an unusable endpoint.
    #[error("traffic descriptor for fd {fd} is invalid: {source}")]
    Endpoint {
        /// Descriptor number.
        fd: u64,
        /// Parse failure.
        #[source]
        source: SocketParseError,
    },
    /// A descriptor number does not fit the platform's descriptor type.
    #[error("traffic descriptor fd {fd} is out of range")]
    DescriptorRange {
        /// Descriptor number.
        fd: u64,
    },
}

impl Traffic {
    /// Describes a listener that will sit at `fd` in the receiving process.
    #[must_use]
    pub fn new(fd: u64, endpoint: &SocketEndpoint) -> Self {
        Self {
            fd,
            addr: endpoint.address(),
            network: endpoint.network().to_owned(),
        }
    }

    /// Endpoint the descriptor was bound for.
    ///
    /// # Errors
    ///
    /// Returns [`TrafficError::Endpoint`] for unknown networks or
    /// malformed addresses.
    pub fn endpoint(&self) -> Result<SocketEndpoint, TrafficError> {
        SocketEndpoint::from_network(&self.network, &self.addr).map_err(|source| {
            TrafficError::Endpoint {
                fd: self.fd,
                source,
            }
        })
    }

    /// Descriptor number as the platform type.
    ///
    /// # Errors
    ///
    /// Returns [`TrafficError::DescriptorRange`] when it does not fit.
    pub fn raw_fd(&self) -> Result<i32, TrafficError> {
        i32::try_from(self.fd).map_err(|_| TrafficError::DescriptorRange { fd: self.fd })
    }
}

/// Reads the inherited set from `reader` until EOF.
///
/// An empty stream means nothing was inherited.
///
/// # Errors
///
/// Returns [`TrafficError::Read`] or [`TrafficError::Decode`].
pub fn read_traffic(mut reader: impl Read) -> Result<TrafficSet, TrafficError> {
    let mut bytes = Vec::new();
    reader
        .read_to_end(&mut bytes)
        .map_err(|source| TrafficError::Read { source })?;
    if bytes.is_empty() {
        return Ok(TrafficSet::default());
    }
    TrafficSet::decode_length_delimited(bytes.as_slice())
        .map_err(|source| TrafficError::Decode { source })
}

/// Frames a set for a successor's stdin.
#[must_use]
pub fn encode_traffic(set: &TrafficSet) -> Vec<u8> {
    set.encode_length_delimited_to_vec()
}

#[cfg(test)]
mod tests;
