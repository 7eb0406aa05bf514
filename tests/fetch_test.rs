//! Fetcher integration tests against an in-process TLS server.
//!
//! Everything here runs on the loopback interface; the live-network checks
//! at the bottom are ignored by default.

use std::io::{Read, Write};
use std::net::TcpListener;
use std::sync::mpsc;
use std::thread;

use openssl::asn1::Asn1Time;
use openssl::bn::BigNum;
use openssl::hash::MessageDigest;
use openssl::nid::Nid;
use openssl::pkey::{PKey, Private};
use openssl::rsa::Rsa;
use openssl::ssl::{NameType, SslAcceptor, SslMethod};
use openssl::x509::extension::SubjectAlternativeName;
use openssl::x509::{X509, X509NameBuilder};

use certpeek::{extract, CertPeekError, CertificateFetcher, Endpoint};

fn server_identity(common_name: &str, sans: &[&str]) -> (X509, PKey<Private>) {
    let key = PKey::from_rsa(Rsa::generate(2048).unwrap()).unwrap();

    let mut name = X509NameBuilder::new().unwrap();
    name.append_entry_by_nid(Nid::COMMONNAME, common_name).unwrap();
    name.append_entry_by_nid(Nid::ORGANIZATIONNAME, "Loopback Test CA")
        .unwrap();
    let name = name.build();

    let mut builder = X509::builder().unwrap();
    builder.set_version(2).unwrap();
    builder.set_subject_name(&name).unwrap();
    builder.set_issuer_name(&name).unwrap();
    builder.set_pubkey(&key).unwrap();
    let serial = BigNum::from_dec_str("90210")
        .unwrap()
        .to_asn1_integer()
        .unwrap();
    builder.set_serial_number(&serial).unwrap();
    let not_before = Asn1Time::days_from_now(0).unwrap();
    builder.set_not_before(&not_before).unwrap();
    let not_after = Asn1Time::days_from_now(30).unwrap();
    builder.set_not_after(&not_after).unwrap();
    if !sans.is_empty() {
        let mut san = SubjectAlternativeName::new();
        for entry in sans {
            san.dns(entry);
        }
        let ext = san.build(&builder.x509v3_context(None, None)).unwrap();
        builder.append_extension(ext).unwrap();
    }
    builder.sign(&key, MessageDigest::sha256()).unwrap();
    (builder.build(), key)
}

/// Serves one TLS connection and reports the SNI value the client sent.
fn spawn_tls_server(
    cert: X509,
    key: PKey<Private>,
) -> (u16, mpsc::Receiver<Option<String>>, thread::JoinHandle<()>) {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let port = listener.local_addr().unwrap().port();

    let mut builder = SslAcceptor::mozilla_intermediate(SslMethod::tls()).unwrap();
    builder.set_private_key(&key).unwrap();
    builder.set_certificate(&cert).unwrap();
    builder.check_private_key().unwrap();
    let acceptor = builder.build();

    let (sender, receiver) = mpsc::channel();
    let handle = thread::spawn(move || {
        let (stream, _) = listener.accept().unwrap();
        match acceptor.accept(stream) {
            Ok(mut tls) => {
                let sni = tls
                    .ssl()
                    .servername(NameType::HOST_NAME)
                    .map(String::from);
                let _ = sender.send(sni);
                // Hold the session open until the client hangs up.
                let mut buf = [0u8; 1];
                let _ = tls.read(&mut buf);
            }
            Err(_) => {
                let _ = sender.send(None);
            }
        }
    });
    (port, receiver, handle)
}

#[test]
fn fetches_certificate_without_judging_trust() {
    let (cert, key) = server_identity("loopback.test", &["loopback.test", "alt.loopback.test"]);
    let (port, sni_seen, server) = spawn_tls_server(cert, key);

    // Self-signed and issued for a different name than we connect to; the
    // fetcher must return it anyway.
    let fetched = CertificateFetcher::new()
        .fetch_port(&Endpoint::new("127.0.0.1"), port)
        .unwrap();

    let metadata = extract(&fetched).unwrap();
    assert_eq!(metadata.common_name.as_deref(), Some("loopback.test"));
    assert_eq!(metadata.serial_number, "90210");
    assert_eq!(
        metadata.subject_alt_names,
        vec!["loopback.test".to_string(), "alt.loopback.test".to_string()]
    );

    assert_eq!(sni_seen.recv().unwrap().as_deref(), Some("127.0.0.1"));
    server.join().unwrap();
}

#[test]
fn sni_override_is_sent_instead_of_the_host() {
    let (cert, key) = server_identity("loopback.test", &[]);
    let (port, sni_seen, server) = spawn_tls_server(cert, key);

    let endpoint = Endpoint::with_sni("127.0.0.1", "www.nodemash.com");
    CertificateFetcher::new()
        .fetch_port(&endpoint, port)
        .unwrap();

    assert_eq!(sni_seen.recv().unwrap().as_deref(), Some("www.nodemash.com"));
    server.join().unwrap();
}

#[test]
fn non_tls_peer_is_a_handshake_error() {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let port = listener.local_addr().unwrap().port();
    let server = thread::spawn(move || {
        let (mut stream, _) = listener.accept().unwrap();
        let _ = stream.write_all(b"220 definitely not TLS\r\n");
    });

    let result = CertificateFetcher::new().fetch_port(&Endpoint::new("127.0.0.1"), port);
    match result {
        Err(CertPeekError::Handshake { .. }) => {}
        other => panic!("expected Handshake error, got {:?}", other.map(|_| "certificate")),
    }
    server.join().unwrap();
}

#[test]
fn refused_connection_is_a_connection_error() {
    // Bind to grab a free port, then close it again before connecting.
    let port = {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        listener.local_addr().unwrap().port()
    };

    let result = CertificateFetcher::new().fetch_port(&Endpoint::new("127.0.0.1"), port);
    match result {
        Err(CertPeekError::Connection { host, .. }) => assert_eq!(host, "127.0.0.1"),
        other => panic!("expected Connection error, got {:?}", other.map(|_| "certificate")),
    }
}

#[test]
fn malformed_address_is_a_connection_error() {
    let result = CertificateFetcher::new().fetch(&Endpoint::new("127.0.0..1"));
    match result {
        Err(CertPeekError::Connection { host, .. }) => assert_eq!(host, "127.0.0..1"),
        other => panic!("expected Connection error, got {:?}", other.map(|_| "certificate")),
    }
}

#[test]
fn unencodable_server_name_fails_before_connecting() {
    // The host would never resolve; the encoding check must fire first.
    let endpoint = Endpoint::with_sni("host.invalid", "bad\u{0}name.example");
    match CertificateFetcher::new().fetch(&endpoint) {
        Err(CertPeekError::HostnameEncoding { name, .. }) => {
            assert_eq!(name, "bad\u{0}name.example");
        }
        other => panic!("expected HostnameEncoding error, got {:?}", other.map(|_| "certificate")),
    }
}

#[test]
#[ignore = "requires network access"]
fn live_google_certificate_metadata() {
    let fetched = CertificateFetcher::new()
        .fetch(&Endpoint::new("google.com"))
        .unwrap();
    let metadata = extract(&fetched).unwrap();

    assert!(metadata.common_name.is_some());
    assert!(metadata
        .subject_alt_names
        .iter()
        .any(|san| san == "*.google.com"));
}

#[test]
#[ignore = "requires network access"]
fn live_sni_override_selects_virtual_host() {
    let endpoint = Endpoint::with_sni("example.net", "www.example.org");
    let fetched = CertificateFetcher::new().fetch(&endpoint).unwrap();
    let metadata = extract(&fetched).unwrap();

    let names: Vec<&str> = metadata
        .subject_alt_names
        .iter()
        .map(String::as_str)
        .collect();
    assert!(names.contains(&"www.example.org"));
}
