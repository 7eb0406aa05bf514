use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::process::exit;
use std::str::FromStr;

use clap::Parser;
use comfy_table::presets::UTF8_FULL;
use comfy_table::Table;
use openssl::ssl::SslVersion;
use strum_macros::EnumString;
use url::Url;

use certpeek::config::Config;
use certpeek::{
    extract, is_valid_hostname, validity_days, CertificateFetcher, CertificateMetadata, Endpoint,
};

mod metrics;

#[derive(Debug, Clone, Copy, EnumString)]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
enum OutputFormat {
    Text,
    Json,
    Table,
}

#[derive(Parser)]
#[command(
    name = "certpeek",
    version,
    about = "Fetch and report the TLS certificate a remote endpoint presents"
)]
struct Cli {
    /// Hostname to check; also accepts host:port or an https:// URL
    hostname: String,

    /// Server name to send in the TLS SNI extension instead of the hostname
    #[arg(short = 't', long = "sni")]
    sni: Option<String>,

    /// Port to connect to (defaults to the port in HOSTNAME, else 443)
    #[arg(short, long)]
    port: Option<u16>,

    /// Output format: text, json or table
    #[arg(short, long)]
    output: Option<String>,

    /// TLS protocol version to offer: 1.0, 1.1, 1.2 or 1.3
    #[arg(long)]
    tls_version: Option<String>,

    /// Path to a TOML configuration file
    #[arg(long)]
    config: Option<PathBuf>,

    /// Exit code to use when the check fails
    #[arg(long)]
    exit_code: Option<i32>,

    /// Only check the hostname for valid DNS syntax, without connecting
    #[arg(long)]
    validate: bool,

    /// Print an example configuration file and exit
    #[arg(long)]
    example_config: bool,

    /// Push metrics to a Prometheus push gateway
    #[arg(long)]
    prometheus: bool,

    /// Prometheus push gateway address
    #[arg(long)]
    prometheus_address: Option<String>,
}

fn main() {
    let cli = Cli::parse();

    if cli.example_config {
        println!("{}", Config::example_toml());
        exit(0);
    }

    let config = load_config(cli.config.as_deref()).merge_with(Config::from_cli_args(
        cli.output.clone(),
        cli.port,
        cli.exit_code,
        if cli.prometheus { Some(true) } else { None },
        cli.prometheus_address.clone(),
    ));
    let failure_code = config.exit_code.unwrap_or(1);

    if cli.validate {
        if is_valid_hostname(&cli.hostname) {
            println!("{} is a valid hostname", cli.hostname);
            exit(0);
        }
        println!("{} is not a valid hostname", cli.hostname);
        exit(failure_code);
    }

    let format = match OutputFormat::from_str(config.output.as_deref().unwrap_or("text")) {
        Ok(format) => format,
        Err(_) => {
            eprintln!(
                "Unknown output format '{}'; expected text, json or table",
                config.output.unwrap_or_default()
            );
            exit(failure_code);
        }
    };

    let fetcher = match cli.tls_version.as_deref() {
        None => CertificateFetcher::new(),
        Some(value) => match parse_tls_version(value) {
            Some(version) => CertificateFetcher::with_version(version),
            None => {
                eprintln!(
                    "Unknown TLS version '{}'; expected 1.0, 1.1, 1.2 or 1.3",
                    value
                );
                exit(failure_code);
            }
        },
    };

    let (host, host_port) = match parse_host_argument(&cli.hostname) {
        Ok(parsed) => parsed,
        Err(reason) => {
            eprintln!("Cannot parse host argument '{}': {}", cli.hostname, reason);
            exit(failure_code);
        }
    };
    let port = host_port.unwrap_or_else(|| config.port.unwrap_or(443));

    let endpoint = match &cli.sni {
        Some(sni) => Endpoint::with_sni(host.clone(), sni.clone()),
        None => Endpoint::new(host.clone()),
    };

    let certificate = match fetcher.fetch_port(&endpoint, port) {
        Ok(certificate) => certificate,
        Err(err) => {
            eprintln!("Failed to check host {}: {}", host, err);
            exit(failure_code);
        }
    };
    let days_left = validity_days(&certificate).ok();
    let metadata = match extract(&certificate) {
        Ok(metadata) => metadata,
        Err(err) => {
            eprintln!("Failed to read certificate from {}: {}", host, err);
            exit(failure_code);
        }
    };

    let rendered = match format {
        OutputFormat::Json => match serde_json::to_string_pretty(&metadata) {
            Ok(json) => json,
            Err(err) => {
                eprintln!("Failed to serialize output: {}", err);
                exit(failure_code);
            }
        },
        OutputFormat::Text => render_text(&endpoint, port, &metadata, days_left),
        OutputFormat::Table => render_table(&endpoint, &metadata, days_left),
    };
    if let Err(err) = writeln!(io::stdout(), "{}", rendered) {
        // A reader like `head` may close the pipe early; that is not a failure.
        if err.kind() == io::ErrorKind::BrokenPipe {
            exit(0);
        }
        eprintln!("Failed to write output: {}", err);
        exit(failure_code);
    }

    if let Some(prom) = &config.prometheus {
        if prom.enabled == Some(true) {
            if let (Some(address), Some(days)) = (&prom.address, days_left) {
                metrics::prom::prometheus_metrics(&host, &metadata, days, address);
            }
        }
    }

    exit(0);
}

fn load_config(path: Option<&Path>) -> Config {
    let defaults = Config::default();
    let load = |path: &Path| match Config::from_file(path) {
        Ok(file_config) => file_config,
        Err(err) => {
            eprintln!("Cannot load configuration from {}: {}", path.display(), err);
            exit(1);
        }
    };
    match path {
        Some(path) => defaults.merge_with(load(path)),
        None => {
            let default_path = Path::new("certpeek.toml");
            if default_path.exists() {
                defaults.merge_with(load(default_path))
            } else {
                defaults
            }
        }
    }
}

/// Accepts a bare hostname, `host:port`, or a URL with a scheme.
fn parse_host_argument(input: &str) -> Result<(String, Option<u16>), String> {
    if input.contains("://") {
        let parsed = Url::parse(input).map_err(|e| e.to_string())?;
        let host = parsed
            .host_str()
            .ok_or_else(|| "URL has no host".to_string())?;
        return Ok((host.to_string(), parsed.port()));
    }
    match input.rsplit_once(':') {
        Some((host, port)) if !host.is_empty() && !host.contains(':') => {
            let port = port
                .parse::<u16>()
                .map_err(|_| format!("invalid port '{}'", port))?;
            Ok((host.to_string(), Some(port)))
        }
        // IPv6 literals and bare names pass through unchanged.
        _ => Ok((input.to_string(), None)),
    }
}

fn parse_tls_version(value: &str) -> Option<SslVersion> {
    match value {
        "1.0" => Some(SslVersion::TLS1),
        "1.1" => Some(SslVersion::TLS1_1),
        "1.2" => Some(SslVersion::TLS1_2),
        "1.3" => Some(SslVersion::TLS1_3),
        _ => None,
    }
}

fn absent(value: &Option<String>) -> String {
    value.clone().unwrap_or_else(|| "None".to_string())
}

fn render_text(
    endpoint: &Endpoint,
    port: u16,
    metadata: &CertificateMetadata,
    days_left: Option<i32>,
) -> String {
    let mut lines = Vec::new();
    lines.push("--------------------------------------".to_string());
    lines.push(format!("Hostname: {}:{}", endpoint.host(), port));
    if let Some(sni) = endpoint.sni_override() {
        lines.push(format!("SNI: {}", sni));
    }
    lines.push(format!("Common Name: {}", absent(&metadata.common_name)));
    lines.push("Issuer Name:".to_string());
    lines.push(format!(
        "\tCommon Name: {}",
        absent(&metadata.issuer_common_name)
    ));
    lines.push(format!(
        "\tOrganization: {}",
        absent(&metadata.organization_name)
    ));
    lines.push(format!(
        "\tOrganizational Unit: {}",
        absent(&metadata.organizational_unit_name)
    ));
    lines.push(format!("\tLocality: {}", absent(&metadata.locality_name)));
    lines.push(format!(
        "\tState or Province: {}",
        absent(&metadata.state_or_province_name)
    ));
    lines.push(format!(
        "\tCountry or Region: {}",
        absent(&metadata.country_name)
    ));
    lines.push(format!(
        "\tEmail Address: {}",
        absent(&metadata.email_address)
    ));
    lines.push(format!("Serial Number: {}", metadata.serial_number));
    lines.push(format!("Valid from: {}", metadata.issue_date));
    lines.push(format!("Valid to: {}", metadata.expiry_date));
    if let Some(days) = days_left {
        lines.push(format!("Days left: {}", days));
    }
    lines.push("Subject Alternative Names:".to_string());
    for san in &metadata.subject_alt_names {
        lines.push(format!("\tDNS Name: {}", san));
    }
    lines.join("\n")
}

fn render_table(
    endpoint: &Endpoint,
    metadata: &CertificateMetadata,
    days_left: Option<i32>,
) -> String {
    let mut table = Table::new();
    table.load_preset(UTF8_FULL);
    table.set_header(vec!["Field".to_string(), "Value".to_string()]);
    table.add_row(vec!["Hostname".to_string(), endpoint.host().to_string()]);
    if let Some(sni) = endpoint.sni_override() {
        table.add_row(vec!["SNI".to_string(), sni.to_string()]);
    }
    table.add_row(vec![
        "Common Name".to_string(),
        absent(&metadata.common_name),
    ]);
    table.add_row(vec![
        "Issuer Common Name".to_string(),
        absent(&metadata.issuer_common_name),
    ]);
    table.add_row(vec![
        "Issuer Organization".to_string(),
        absent(&metadata.organization_name),
    ]);
    table.add_row(vec![
        "Issuer Organizational Unit".to_string(),
        absent(&metadata.organizational_unit_name),
    ]);
    table.add_row(vec![
        "Issuer Locality".to_string(),
        absent(&metadata.locality_name),
    ]);
    table.add_row(vec![
        "Issuer State or Province".to_string(),
        absent(&metadata.state_or_province_name),
    ]);
    table.add_row(vec![
        "Issuer Country or Region".to_string(),
        absent(&metadata.country_name),
    ]);
    table.add_row(vec![
        "Issuer Email Address".to_string(),
        absent(&metadata.email_address),
    ]);
    table.add_row(vec![
        "Serial Number".to_string(),
        metadata.serial_number.clone(),
    ]);
    table.add_row(vec!["Valid from".to_string(), metadata.issue_date.clone()]);
    table.add_row(vec!["Valid to".to_string(), metadata.expiry_date.clone()]);
    if let Some(days) = days_left {
        table.add_row(vec!["Days left".to_string(), days.to_string()]);
    }
    table.add_row(vec![
        "Subject Alternative Names".to_string(),
        metadata.subject_alt_names.join(", "),
    ]);
    table.to_string()
}
