// Licensed under the Apache License, Version 2.0 (see LICENSE).
use std::fmt::Write;
use std::sync::Arc;

use rustls::client::danger::{HandshakeSignatureValid, ServerCertVerified, ServerCertVerifier};
use rustls::crypto::{verify_tls12_signature, verify_tls13_signature};
use rustls::{ClientConfig, DigitallySignedStruct, RootCertStore};
use rustls_pki_types::{CertificateDer, ServerName, UnixTime};

/// Describes how a dial's TLS `ClientConfig` should be built: which root CA certs to trust, and
/// whether certificate verification is enabled at all (`Insecure` dial option).
#[derive(Default, Clone)]
pub struct Config {
    pub root_ca_certs: Option<Vec<CertificateDer<'static>>>,
    pub certificate_check: CertificateCheck,
}

impl Config {
    pub fn new<Buf: AsRef<[u8]>>(root_ca_certs: Option<Buf>) -> Result<Self, String> {
        let root_ca_certs = root_ca_certs
            .map(|raw| {
                rustls_pemfile::certs(&mut std::io::Cursor::new(raw.as_ref()))
                    .collect::<Result<Vec<_>, _>>()
                    .map_err(|e| format!("failed to parse TLS certs data: {e:?}"))
            })
            .transpose()?;

        Ok(Self { root_ca_certs, certificate_check: CertificateCheck::Enabled })
    }

    /// The config an `Insecure` remote dial uses: certificate verification entirely disabled.
    pub fn insecure() -> Self {
        Self { root_ca_certs: None, certificate_check: CertificateCheck::DangerouslyDisabled }
    }
}

impl TryFrom<Config> for ClientConfig {
    type Error = String;

    fn try_from(config: Config) -> Result<Self, Self::Error> {
        let tls_config = ClientConfig::builder();

        match config.certificate_check {
            CertificateCheck::DangerouslyDisabled => Ok(tls_config
                .dangerous()
                .with_custom_certificate_verifier(Arc::new(NoVerifier))
                .with_no_client_auth()),
            CertificateCheck::Enabled => {
                let mut root_cert_store = RootCertStore::empty();
                match config.root_ca_certs {
                    Some(certs) => {
                        for cert in certs {
                            root_cert_store
                                .add(cert)
                                .map_err(|e| format!("failed adding CA cert to store: {e:?}"))?;
                        }
                    }
                    None => {
                        let native = rustls_native_certs::load_native_certs();
                        if !native.errors.is_empty() {
                            let mut msg = String::from(
                                "could not discover root CA certs to use for TLS. Consider \
                                 setting an explicit TLS config instead. Error(s):\n\n",
                            );
                            for error in &native.errors {
                                writeln!(&mut msg, "{error}\n").expect("write into String");
                            }
                            return Err(msg);
                        }
                        root_cert_store.add_parsable_certificates(native.certs);
                    }
                }
                Ok(tls_config.with_root_certificates(root_cert_store).with_no_client_auth())
            }
        }
    }
}

#[derive(Clone)]
pub enum CertificateCheck {
    Enabled,
    DangerouslyDisabled,
}

impl Default for CertificateCheck {
    fn default() -> Self {
        Self::Enabled
    }
}

/// A verifier that accepts any server certificate, backing `Insecure` dials.
#[derive(Debug)]
pub(crate) struct NoVerifier;

impl ServerCertVerifier for NoVerifier {
    fn verify_server_cert(
        &self,
        _end_entity: &CertificateDer<'_>,
        _intermediates: &[CertificateDer<'_>],
        _server_name: &ServerName<'_>,
        _ocsp: &[u8],
        _now: UnixTime,
    ) -> Result<ServerCertVerified, rustls::Error> {
        Ok(ServerCertVerified::assertion())
    }

    fn verify_tls12_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        verify_tls12_signature(
            message,
            cert,
            dss,
            &rustls::crypto::aws_lc_rs::default_provider().signature_verification_algorithms,
        )
    }

    fn verify_tls13_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        verify_tls13_signature(
            message,
            cert,
            dss,
            &rustls::crypto::aws_lc_rs::default_provider().signature_verification_algorithms,
        )
    }

    fn supported_verify_schemes(&self) -> Vec<rustls::SignatureScheme> {
        rustls::crypto::aws_lc_rs::default_provider()
            .signature_verification_algorithms
            .supported_schemes()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insecure_config_builds_a_client_config() {
        let _ = crate::initialize();
        let config = Config::insecure();
        assert!(matches!(config.certificate_check, CertificateCheck::DangerouslyDisabled));
        let _client_config: ClientConfig = config.try_into().unwrap();
    }

    #[test]
    fn default_config_requires_certificate_verification() {
        let config = Config::default();
        assert!(matches!(config.certificate_check, CertificateCheck::Enabled));
    }
}
