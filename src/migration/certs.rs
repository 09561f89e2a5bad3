//! Self-signed certificates for the write blocker webhook.

use rcgen::{
    BasicConstraints, CertificateParams, DistinguishedName, DnType, ExtendedKeyUsagePurpose, IsCa,
    KeyPair, KeyUsagePurpose,
};
use time::{Duration, OffsetDateTime};

use crate::error::Result;

/// PEM encoded certificate and private key.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Certificate {
    pub cert_pem: String,
    pub key_pem: String,
}

/// A CA able to sign further certificates.
pub struct CertificateAuthority {
    pub certificate: Certificate,
    cert: rcgen::Certificate,
    key: KeyPair,
}

fn base_params(common_name: &str, alt_names: Vec<String>, days: i64) -> Result<CertificateParams> {
    let mut params = CertificateParams::new(alt_names)?;
    let mut name = DistinguishedName::new();
    name.push(DnType::CommonName, common_name);
    params.distinguished_name = name;

    let now = OffsetDateTime::now_utc();
    params.not_before = now;
    params.not_after = now + Duration::days(days);
    params.key_usages = vec![
        KeyUsagePurpose::DigitalSignature,
        KeyUsagePurpose::KeyEncipherment,
    ];
    params.extended_key_usages = vec![
        ExtendedKeyUsagePurpose::ServerAuth,
        ExtendedKeyUsagePurpose::ClientAuth,
    ];
    Ok(params)
}

/// Self-signed CA valid for `days` days.
pub fn generate_certificate_authority(common_name: &str, days: i64) -> Result<CertificateAuthority> {
    let mut params = base_params(common_name, Vec::new(), days)?;
    params.is_ca = IsCa::Ca(BasicConstraints::Unconstrained);
    params.key_usages = vec![
        KeyUsagePurpose::KeyCertSign,
        KeyUsagePurpose::CrlSign,
        KeyUsagePurpose::DigitalSignature,
        KeyUsagePurpose::KeyEncipherment,
    ];

    let key = KeyPair::generate()?;
    let cert = params.self_signed(&key)?;
    Ok(CertificateAuthority {
        certificate: Certificate {
            cert_pem: cert.pem(),
            key_pem: key.serialize_pem(),
        },
        cert,
        key,
    })
}

/// Serving certificate for `common_name` and `alt_names`, signed by `ca`.
pub fn generate_signed_certificate(
    common_name: &str,
    alt_names: &[String],
    days: i64,
    ca: &CertificateAuthority,
) -> Result<Certificate> {
    let params = base_params(common_name, alt_names.to_vec(), days)?;
    let key = KeyPair::generate()?;
    let cert = params.signed_by(&key, &ca.cert, &ca.key)?;
    Ok(Certificate {
        cert_pem: cert.pem(),
        key_pem: key.serialize_pem(),
    })
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    fn parse(cert: &Certificate) -> (usize, bool) {
        let certs = rustls_pemfile::certs(&mut cert.cert_pem.as_bytes())
            .collect::<std::result::Result<Vec<_>, _>>()
            .unwrap();
        let key = rustls_pemfile::private_key(&mut cert.key_pem.as_bytes()).unwrap();
        (certs.len(), key.is_some())
    }

    #[test]
    fn test_ca_is_valid_pem() {
        let ca = generate_certificate_authority("service-catalog-blocker-ca", 3650).unwrap();
        assert_eq!(parse(&ca.certificate), (1, true));
    }

    #[test]
    fn test_signed_certificate_differs_from_ca() {
        let ca = generate_certificate_authority("blocker-ca", 3650).unwrap();
        let leaf = generate_signed_certificate(
            "blocker",
            &["blocker.catalog".to_string(), "blocker.catalog.svc".to_string()],
            3650,
            &ca,
        )
        .unwrap();

        assert_eq!(parse(&leaf), (1, true));
        assert_ne!(leaf.cert_pem, ca.certificate.cert_pem);
        assert_ne!(leaf.key_pem, ca.certificate.key_pem);
    }

    #[test]
    fn test_invalid_alt_name_is_rejected() {
        let ca = generate_certificate_authority("blocker-ca", 1).unwrap();
        assert!(generate_signed_certificate("blocker", &["blöcker.catalog".to_string()], 1, &ca).is_err());
    }
}
