//! Minimal DER decoding for the certificate fields this crate inspects.
//!
//! The TLS layer hands back a parsed certificate, but the `subjectAltName`
//! extension value and the validity timestamps are consumed here straight
//! from the certificate's DER bytes. Only the structures actually needed are
//! understood: a TLV cursor, the `GeneralNames` sequence, the path through
//! `TBSCertificate` to the extension list and the validity field.

use std::fmt;

/// Upper bound on `GeneralName` entries accepted in a single
/// `subjectAltName` extension. A certificate may legally carry any number,
/// but a corrupt or hostile one must not drive unbounded allocation.
pub const MAX_SAN_ENTRIES: usize = 1024;

const TAG_BOOLEAN: u8 = 0x01;
const TAG_INTEGER: u8 = 0x02;
const TAG_OCTET_STRING: u8 = 0x04;
const TAG_OID: u8 = 0x06;
const TAG_UTC_TIME: u8 = 0x17;
const TAG_GENERALIZED_TIME: u8 = 0x18;
const TAG_SEQUENCE: u8 = 0x30;
// EXPLICIT [0] version wrapper in TBSCertificate.
const TAG_CONTEXT_0: u8 = 0xA0;
// EXPLICIT [3] extensions wrapper in TBSCertificate.
const TAG_CONTEXT_3: u8 = 0xA3;
// GeneralName CHOICE: dNSName [2] IA5String, primitive.
const TAG_DNS_NAME: u8 = 0x82;

// id-ce-subjectAltName, 2.5.29.17.
const OID_SUBJECT_ALT_NAME: &[u8] = &[0x55, 0x1D, 0x11];

/// Failure while decoding DER structures.
///
/// One failure per call: no partial results are ever returned past an error.
#[derive(Debug, PartialEq, Eq)]
pub enum AsnDecodeError {
    /// The input ended before a declared length was satisfied.
    Truncated,
    /// A length octet sequence is not a valid definite DER length.
    InvalidLength,
    /// A structure carried a tag other than the one its position requires.
    UnexpectedTag {
        /// What the decoder was looking for at this position
        expected: &'static str,
        /// The tag byte actually found
        found: u8,
    },
    /// Bytes remained after the outermost structure was consumed.
    TrailingData,
    /// The `GeneralNames` sequence exceeded [`MAX_SAN_ENTRIES`].
    TooManyNames {
        /// Number of entries seen when decoding stopped
        count: usize,
    },
    /// A `dNSName` entry is not a valid IA5 (ASCII) string.
    InvalidDnsName,
    /// A validity timestamp is not a valid ASCII time string.
    InvalidTime,
}

impl fmt::Display for AsnDecodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Truncated => write!(f, "DER input truncated"),
            Self::InvalidLength => write!(f, "invalid DER length encoding"),
            Self::UnexpectedTag { expected, found } => {
                write!(f, "expected {}, found tag 0x{:02X}", expected, found)
            }
            Self::TrailingData => write!(f, "trailing bytes after DER structure"),
            Self::TooManyNames { count } => {
                write!(
                    f,
                    "subjectAltName carries {} entries, more than the {} accepted",
                    count, MAX_SAN_ENTRIES
                )
            }
            Self::InvalidDnsName => write!(f, "dNSName entry is not a valid IA5 string"),
            Self::InvalidTime => write!(f, "validity timestamp is not a valid time string"),
        }
    }
}

impl std::error::Error for AsnDecodeError {}

/// Cursor over a DER byte buffer, yielding one TLV at a time.
struct DerReader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> DerReader<'a> {
    fn new(data: &'a [u8]) -> Self {
        DerReader { data, pos: 0 }
    }

    fn at_end(&self) -> bool {
        self.pos >= self.data.len()
    }

    fn peek_tag(&self) -> Option<u8> {
        self.data.get(self.pos).copied()
    }

    /// Reads one tag-length-value triplet and advances past it.
    fn read_tlv(&mut self) -> Result<(u8, &'a [u8]), AsnDecodeError> {
        let tag = *self.data.get(self.pos).ok_or(AsnDecodeError::Truncated)?;
        self.pos += 1;
        let first = *self.data.get(self.pos).ok_or(AsnDecodeError::Truncated)?;
        self.pos += 1;

        let len = if first < 0x80 {
            first as usize
        } else {
            // Long form. 0x80 would be the indefinite form, which DER
            // forbids; more than four octets cannot describe a certificate.
            let octets = (first & 0x7F) as usize;
            if octets == 0 || octets > 4 {
                return Err(AsnDecodeError::InvalidLength);
            }
            let mut len = 0usize;
            for _ in 0..octets {
                let b = *self.data.get(self.pos).ok_or(AsnDecodeError::Truncated)?;
                self.pos += 1;
                len = (len << 8) | b as usize;
            }
            len
        };

        let end = self.pos.checked_add(len).ok_or(AsnDecodeError::InvalidLength)?;
        if end > self.data.len() {
            return Err(AsnDecodeError::Truncated);
        }
        let value = &self.data[self.pos..end];
        self.pos = end;
        Ok((tag, value))
    }

    /// Reads one TLV and checks its tag.
    fn expect(&mut self, tag: u8, what: &'static str) -> Result<&'a [u8], AsnDecodeError> {
        let (found, value) = self.read_tlv()?;
        if found != tag {
            return Err(AsnDecodeError::UnexpectedTag {
                expected: what,
                found,
            });
        }
        Ok(value)
    }
}

/// Decodes a DER `GeneralNames` sequence — the value of a `subjectAltName`
/// extension — and returns the `dNSName` entries it carries.
///
/// Entries of every other `GeneralName` variant (IP address, URI, email,
/// directory name, ...) are skipped, not errored. Encoding order and
/// duplicates are preserved. More than [`MAX_SAN_ENTRIES`] entries of any
/// kind abort decoding.
pub fn decode_san(data: &[u8]) -> Result<Vec<String>, AsnDecodeError> {
    let mut outer = DerReader::new(data);
    let seq = outer.expect(TAG_SEQUENCE, "GeneralNames SEQUENCE")?;
    if !outer.at_end() {
        return Err(AsnDecodeError::TrailingData);
    }

    let mut names = Vec::new();
    let mut entries = DerReader::new(seq);
    let mut count = 0usize;
    while !entries.at_end() {
        let (tag, value) = entries.read_tlv()?;
        count += 1;
        if count > MAX_SAN_ENTRIES {
            return Err(AsnDecodeError::TooManyNames { count });
        }
        if tag != TAG_DNS_NAME {
            continue;
        }
        let name = std::str::from_utf8(value).map_err(|_| AsnDecodeError::InvalidDnsName)?;
        if !name.is_ascii() {
            return Err(AsnDecodeError::InvalidDnsName);
        }
        names.push(name.to_string());
    }
    Ok(names)
}

/// Locates the `subjectAltName` extension inside a certificate DER and
/// returns its inner OCTET STRING value, or `None` when the certificate
/// carries no such extension.
pub fn subject_alt_name_extension(cert_der: &[u8]) -> Result<Option<Vec<u8>>, AsnDecodeError> {
    let mut tbs = tbs_reader(cert_der)?;
    skip_past_issuer(&mut tbs)?;
    tbs.expect(TAG_SEQUENCE, "validity SEQUENCE")?;
    tbs.expect(TAG_SEQUENCE, "subject Name")?;
    tbs.expect(TAG_SEQUENCE, "subjectPublicKeyInfo")?;

    // Remaining TBS fields: optional issuerUniqueID [1], subjectUniqueID [2]
    // and the [3] extensions wrapper.
    while !tbs.at_end() {
        let (tag, value) = tbs.read_tlv()?;
        if tag != TAG_CONTEXT_3 {
            continue;
        }
        let mut wrapper = DerReader::new(value);
        let list = wrapper.expect(TAG_SEQUENCE, "Extensions SEQUENCE")?;
        let mut extensions = DerReader::new(list);
        while !extensions.at_end() {
            let ext = extensions.expect(TAG_SEQUENCE, "Extension SEQUENCE")?;
            let mut fields = DerReader::new(ext);
            let oid = fields.expect(TAG_OID, "extnID OBJECT IDENTIFIER")?;
            let (mut tag, mut value) = fields.read_tlv()?;
            if tag == TAG_BOOLEAN {
                // Optional criticality flag precedes the value.
                let tlv = fields.read_tlv()?;
                tag = tlv.0;
                value = tlv.1;
            }
            if tag != TAG_OCTET_STRING {
                return Err(AsnDecodeError::UnexpectedTag {
                    expected: "extnValue OCTET STRING",
                    found: tag,
                });
            }
            if oid == OID_SUBJECT_ALT_NAME {
                return Ok(Some(value.to_vec()));
            }
        }
        return Ok(None);
    }
    Ok(None)
}

/// Reads the `notBefore`/`notAfter` timestamps from a certificate DER.
///
/// UTCTime values are widened to four-digit years with the RFC 5280
/// fifty-year window, so both encodings come back in the
/// `YYYYMMDDHHMMSSZ` shape well-formed certificates use. The strings are
/// otherwise returned as encoded; strict parsing is the caller's concern.
pub fn validity(cert_der: &[u8]) -> Result<(String, String), AsnDecodeError> {
    let mut tbs = tbs_reader(cert_der)?;
    skip_past_issuer(&mut tbs)?;
    let validity = tbs.expect(TAG_SEQUENCE, "validity SEQUENCE")?;
    let mut times = DerReader::new(validity);
    let not_before = read_time(&mut times)?;
    let not_after = read_time(&mut times)?;
    Ok((not_before, not_after))
}

fn tbs_reader(cert_der: &[u8]) -> Result<DerReader<'_>, AsnDecodeError> {
    let mut outer = DerReader::new(cert_der);
    let cert = outer.expect(TAG_SEQUENCE, "Certificate SEQUENCE")?;
    let mut cert_fields = DerReader::new(cert);
    let tbs = cert_fields.expect(TAG_SEQUENCE, "TBSCertificate SEQUENCE")?;
    Ok(DerReader::new(tbs))
}

fn skip_past_issuer(tbs: &mut DerReader<'_>) -> Result<(), AsnDecodeError> {
    if tbs.peek_tag() == Some(TAG_CONTEXT_0) {
        tbs.read_tlv()?;
    }
    tbs.expect(TAG_INTEGER, "serialNumber INTEGER")?;
    tbs.expect(TAG_SEQUENCE, "signature AlgorithmIdentifier")?;
    tbs.expect(TAG_SEQUENCE, "issuer Name")?;
    Ok(())
}

fn read_time(times: &mut DerReader<'_>) -> Result<String, AsnDecodeError> {
    let (tag, value) = times.read_tlv()?;
    let text = std::str::from_utf8(value).map_err(|_| AsnDecodeError::InvalidTime)?;
    if !text.is_ascii() {
        return Err(AsnDecodeError::InvalidTime);
    }
    match tag {
        TAG_UTC_TIME => Ok(expand_utc_year(text)),
        TAG_GENERALIZED_TIME => Ok(text.to_string()),
        found => Err(AsnDecodeError::UnexpectedTag {
            expected: "UTCTime or GeneralizedTime",
            found,
        }),
    }
}

fn expand_utc_year(text: &str) -> String {
    match text.get(..2).and_then(|yy| yy.parse::<u8>().ok()) {
        Some(yy) if yy < 50 => format!("20{}", text),
        Some(_) => format!("19{}", text),
        // Leave malformed values alone; the strict date parse rejects them.
        None => text.to_string(),
    }
}
