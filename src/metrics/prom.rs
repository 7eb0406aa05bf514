use lazy_static::lazy_static;
use prometheus::{labels, register_gauge, Gauge};

use certpeek::CertificateMetadata;

lazy_static! {
    static ref CERTPEEK_DAYS_BEFORE_EXPIRED: Gauge =
        register_gauge!("certpeek_days_before_expired", "days before expiration").unwrap();
    static ref CERTPEEK_SUBJECT_ALT_NAMES: Gauge = register_gauge!(
        "certpeek_subject_alt_names",
        "number of subject alternative names"
    )
    .unwrap();
}

/// Function to push metrics to prometheus
/// # Arguments
/// * `host` - Hostname the certificate was fetched from
/// * `metadata` - Extracted certificate metadata
/// * `validity_days` - Days until the certificate expires
/// * `prometheus_address` - String of prometheus push gateway address
pub fn prometheus_metrics(
    host: &str,
    metadata: &CertificateMetadata,
    validity_days: i32,
    prometheus_address: &str,
) {
    CERTPEEK_DAYS_BEFORE_EXPIRED.set(f64::from(validity_days));
    CERTPEEK_SUBJECT_ALT_NAMES.set(metadata.subject_alt_names.len() as f64);

    let issuer = metadata
        .issuer_common_name
        .clone()
        .unwrap_or_else(|| "None".to_string());

    let metric_families = prometheus::gather();
    let prometheus_client = prometheus::push_metrics(
        "certpeek",
        labels! {
            "instance".to_owned() => "certpeek".to_owned(),
            "job".to_owned() => "certpeek".to_owned(),
            "host".to_owned() => host.to_owned(),
            "issuer".to_owned() => issuer,
            "expired".to_owned() => (validity_days < 0).to_string(),
        },
        &format!("{}/metrics/job", prometheus_address),
        metric_families,
        None,
    );

    match prometheus_client {
        Ok(_) => {}
        Err(e) => eprintln!("\nFailed to push metrics to prometheus: {}", e),
    }
}
