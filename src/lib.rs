//! Fetch the X.509 certificate a remote TLS endpoint presents and extract a
//! normalized metadata record from it. The peer certificate is accepted
//! unconditionally: this crate reports facts about a certificate, it does
//! not judge trust.

use openssl::asn1::Asn1Time;
use openssl::nid::Nid;
use openssl::ssl::{Ssl, SslContext, SslMethod, SslVerifyMode, SslVersion};
use openssl::x509::{X509, X509NameRef, X509Ref};
use serde::{Deserialize, Serialize};
use std::io;
use std::net::{TcpStream, ToSocketAddrs};
use std::time::Duration;

pub mod asn1;
pub mod config;
pub mod error;
pub mod hostname;

pub use error::CertPeekError;
pub use hostname::is_valid_hostname;

static TIMEOUT: u64 = 30;

/// A remote endpoint to fetch the peer certificate from.
///
/// `host` is the connect target; the optional SNI override is what goes into
/// the ClientHello instead of `host`. Immutable once constructed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    host: String,
    sni_override: Option<String>,
}

impl Endpoint {
    pub fn new(host: impl Into<String>) -> Self {
        Endpoint {
            host: host.into(),
            sni_override: None,
        }
    }

    pub fn with_sni(host: impl Into<String>, sni_override: impl Into<String>) -> Self {
        Endpoint {
            host: host.into(),
            sni_override: Some(sni_override.into()),
        }
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn sni_override(&self) -> Option<&str> {
        self.sni_override.as_deref()
    }

    /// The name that is sent in the SNI extension.
    pub fn server_name(&self) -> &str {
        self.sni_override.as_deref().unwrap_or(&self.host)
    }
}

/// Retrieves the leaf certificate a TLS endpoint presents.
///
/// The TLS protocol version is pinned at construction time (TLS 1.2 unless
/// overridden) and applies to every `fetch` made through this value. No
/// certificate or trust validation is performed during the handshake.
#[derive(Clone, Copy)]
pub struct CertificateFetcher {
    version: SslVersion,
}

impl Default for CertificateFetcher {
    fn default() -> Self {
        Self::new()
    }
}

impl CertificateFetcher {
    pub fn new() -> Self {
        CertificateFetcher {
            version: SslVersion::TLS1_2,
        }
    }

    pub fn with_version(version: SslVersion) -> Self {
        CertificateFetcher { version }
    }

    /// Fetches the peer certificate from port 443.
    pub fn fetch(&self, endpoint: &Endpoint) -> Result<X509, CertPeekError> {
        self.fetch_port(endpoint, 443)
    }

    /// Fetches the peer certificate from the given port.
    ///
    /// Blocks for DNS resolution, TCP connect and the TLS handshake, bounded
    /// by a 30-second timeout on each of connect, read and write. The socket
    /// is owned by this call and released on every exit path.
    pub fn fetch_port(&self, endpoint: &Endpoint, port: u16) -> Result<X509, CertPeekError> {
        let server_name = endpoint.server_name();
        ensure_encodable(server_name)?;

        let connection_error = |source: io::Error| CertPeekError::Connection {
            host: endpoint.host.clone(),
            source,
        };

        let remote = format!("{}:{}", endpoint.host, port);
        let addresses = remote.to_socket_addrs().map_err(connection_error)?;

        let mut tcp_stream = None;
        let mut last_error = None;
        for address in addresses {
            match TcpStream::connect_timeout(&address, Duration::from_secs(TIMEOUT)) {
                Ok(stream) => {
                    tcp_stream = Some(stream);
                    break;
                }
                Err(e) => last_error = Some(e),
            }
        }
        let tcp_stream = match tcp_stream {
            Some(stream) => stream,
            None => {
                return Err(connection_error(last_error.unwrap_or_else(|| {
                    io::Error::new(io::ErrorKind::AddrNotAvailable, "no addresses resolved")
                })))
            }
        };
        tcp_stream
            .set_read_timeout(Some(Duration::from_secs(TIMEOUT)))
            .map_err(connection_error)?;
        tcp_stream
            .set_write_timeout(Some(Duration::from_secs(TIMEOUT)))
            .map_err(connection_error)?;

        let ssl = self.client_ssl(server_name)?;
        // From here the stream belongs to the TLS session; dropping either
        // side of the handshake result closes the socket.
        let tls_stream = ssl.connect(tcp_stream)?;
        tls_stream
            .ssl()
            .peer_certificate()
            .ok_or_else(|| CertPeekError::Handshake {
                details: format!("{} presented no certificate", endpoint.host),
            })
    }

    fn client_ssl(&self, server_name: &str) -> Result<Ssl, CertPeekError> {
        let handshake_error = |e: openssl::error::ErrorStack| CertPeekError::Handshake {
            details: e.to_string(),
        };

        let mut builder = SslContext::builder(SslMethod::tls()).map_err(handshake_error)?;
        builder.set_verify(SslVerifyMode::NONE);
        builder
            .set_min_proto_version(Some(self.version))
            .map_err(handshake_error)?;
        builder
            .set_max_proto_version(Some(self.version))
            .map_err(handshake_error)?;
        let context = builder.build();

        let mut ssl = Ssl::new(&context).map_err(handshake_error)?;
        ssl.set_hostname(server_name).map_err(handshake_error)?;
        Ok(ssl)
    }
}

/// Normalized metadata of one certificate.
///
/// Distinguished-name components that are not set in the certificate are
/// `None`; a component that is present but empty is `Some("")`. Dates are
/// `DD.MM.YYYY` in UTC. `issue_date <= expiry_date` is not enforced;
/// malformed certificates are reported as-is.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CertificateMetadata {
    pub issuer_common_name: Option<String>,
    pub organization_name: Option<String>,
    pub organizational_unit_name: Option<String>,
    pub locality_name: Option<String>,
    pub state_or_province_name: Option<String>,
    pub country_name: Option<String>,
    pub email_address: Option<String>,
    /// Subject common name
    pub common_name: Option<String>,
    /// Decimal rendering of the arbitrary-precision serial number
    pub serial_number: String,
    pub issue_date: String,
    pub expiry_date: String,
    pub subject_alt_names: Vec<String>,
}

/// Assembles the metadata record for a certificate.
///
/// A malformed or missing `subjectAltName` extension degrades to an empty
/// list instead of failing the whole extraction. A validity timestamp that
/// does not match the `YYYYMMDDHHMMSSZ` wire shape is fatal
/// ([`CertPeekError::DateFormat`]).
pub fn extract(cert: &X509Ref) -> Result<CertificateMetadata, CertPeekError> {
    let issuer = cert.issuer_name();

    let serial = cert
        .serial_number()
        .to_bn()
        .and_then(|bn| bn.to_dec_str().map(|s| s.to_string()))?;

    let der = cert.to_der()?;
    let (not_before, not_after) =
        asn1::validity(&der).map_err(|e| CertPeekError::Certificate {
            reason: format!("cannot read validity: {}", e),
        })?;

    Ok(CertificateMetadata {
        issuer_common_name: name_entry(issuer, Nid::COMMONNAME),
        organization_name: name_entry(issuer, Nid::ORGANIZATIONNAME),
        organizational_unit_name: name_entry(issuer, Nid::ORGANIZATIONALUNITNAME),
        locality_name: name_entry(issuer, Nid::LOCALITYNAME),
        state_or_province_name: name_entry(issuer, Nid::STATEORPROVINCENAME),
        country_name: name_entry(issuer, Nid::COUNTRYNAME),
        email_address: name_entry(issuer, Nid::PKCS9_EMAILADDRESS),
        common_name: name_entry(cert.subject_name(), Nid::COMMONNAME),
        serial_number: serial,
        issue_date: format_wire_date(&not_before)?,
        expiry_date: format_wire_date(&not_after)?,
        subject_alt_names: san_entries(&der),
    })
}

/// Days from now until the certificate's `notAfter`, negative once expired.
pub fn validity_days(cert: &X509Ref) -> Result<i32, CertPeekError> {
    let today = Asn1Time::days_from_now(0)?;
    let diff = today.diff(cert.not_after())?;
    Ok(diff.days)
}

fn name_entry(name: &X509NameRef, nid: Nid) -> Option<String> {
    name.entries_by_nid(nid)
        .next()
        .and_then(|entry| entry.data().as_utf8().ok())
        .map(|value| value.to_string())
}

// Best effort: an absent extension and a malformed one both come back empty.
fn san_entries(cert_der: &[u8]) -> Vec<String> {
    match asn1::subject_alt_name_extension(cert_der) {
        Ok(Some(value)) => asn1::decode_san(&value).unwrap_or_default(),
        _ => Vec::new(),
    }
}

fn format_wire_date(value: &str) -> Result<String, CertPeekError> {
    let date_error = |reason: &str| CertPeekError::DateFormat {
        value: value.to_string(),
        reason: reason.to_string(),
    };

    let bytes = value.as_bytes();
    if bytes.len() != 15 || bytes[14] != b'Z' || !bytes[..14].iter().all(u8::is_ascii_digit) {
        return Err(date_error("expected YYYYMMDDHHMMSSZ"));
    }

    let component = |range: std::ops::Range<usize>| -> u32 {
        value[range].parse().unwrap_or(u32::MAX)
    };
    let month = component(4..6);
    let day = component(6..8);
    let hour = component(8..10);
    let minute = component(10..12);
    let second = component(12..14);
    if !(1..=12).contains(&month)
        || !(1..=31).contains(&day)
        || hour > 23
        || minute > 59
        || second > 60
    {
        return Err(date_error("time component out of range"));
    }

    Ok(format!("{}.{}.{}", &value[6..8], &value[4..6], &value[0..4]))
}

fn ensure_encodable(server_name: &str) -> Result<(), CertPeekError> {
    let encoding_error = |reason: &str| CertPeekError::HostnameEncoding {
        name: server_name.to_string(),
        reason: reason.to_string(),
    };

    if server_name.is_empty() {
        return Err(encoding_error("server name is empty"));
    }
    if server_name.bytes().any(|b| b == 0) {
        return Err(encoding_error("contains an embedded NUL byte"));
    }
    if !server_name.is_ascii() {
        return Err(encoding_error(
            "contains non-ASCII characters; give internationalized names in A-label form",
        ));
    }
    Ok(())
}
