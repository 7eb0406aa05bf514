//! Error types for certificate fetching and metadata extraction.
//!
//! This module defines the typed failures the core can surface. SAN decode
//! failures are deliberately absent: they are owned by the `asn1` module and
//! recovered into an empty name list during extraction, never propagated.

use std::fmt;
use std::io;

/// Error type for peer-certificate operations.
#[derive(Debug)]
pub enum CertPeekError {
    /// DNS resolution or TCP connection failed
    Connection {
        /// The host string the caller asked to reach
        host: String,
        /// The underlying I/O error
        source: io::Error,
    },

    /// The host or SNI override cannot be encoded as a wire hostname
    HostnameEncoding {
        /// The offending name
        name: String,
        /// Why it cannot be sent
        reason: String,
    },

    /// TLS handshake failed, or the peer presented no certificate
    Handshake {
        /// Details about why the handshake failed
        details: String,
    },

    /// A validity timestamp does not use the expected wire encoding
    DateFormat {
        /// The timestamp string as found in the certificate
        value: String,
        /// Why it could not be parsed
        reason: String,
    },

    /// Reading a field out of the parsed certificate failed
    Certificate {
        /// Description of what went wrong
        reason: String,
    },
}

impl fmt::Display for CertPeekError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Connection { host, source } => {
                write!(
                    f,
                    "Failed to connect to {}: {}. Check that the host is spelled correctly and reachable.",
                    host, source
                )
            }
            Self::HostnameEncoding { name, reason } => {
                write!(f, "Cannot send '{}' as a server name: {}", name, reason)
            }
            Self::Handshake { details } => {
                write!(f, "TLS handshake failed: {}", details)
            }
            Self::DateFormat { value, reason } => {
                write!(f, "Unexpected certificate timestamp '{}': {}", value, reason)
            }
            Self::Certificate { reason } => {
                write!(f, "Certificate error: {}", reason)
            }
        }
    }
}

impl std::error::Error for CertPeekError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Connection { source, .. } => Some(source),
            _ => None,
        }
    }
}

impl From<openssl::error::ErrorStack> for CertPeekError {
    fn from(e: openssl::error::ErrorStack) -> Self {
        Self::Certificate {
            reason: e.to_string(),
        }
    }
}

impl<S: fmt::Debug> From<openssl::ssl::HandshakeError<S>> for CertPeekError {
    fn from(e: openssl::ssl::HandshakeError<S>) -> Self {
        Self::Handshake {
            details: format!("{}", e),
        }
    }
}
