//! Maps the authentication section onto librdkafka client properties.

use rdkafka::ClientConfig;

use crate::config::{Authentication, SaslConfig, TlsConfig};
use crate::error::{Error, Result};

pub fn apply(auth: &Authentication, config: &mut ClientConfig) -> Result<()> {
    match auth.kind.as_str() {
        "" | "none" => Ok(()),
        "ssl" => {
            config.set("security.protocol", "ssl");
            apply_tls(&auth.tls_config, config);
            Ok(())
        }
        "sasl" => apply_sasl(&auth.sasl_config, config),
        other => Err(Error::UnsupportedAuthentication(other.to_string())),
    }
}

fn apply_sasl(sasl: &SaslConfig, config: &mut ClientConfig) -> Result<()> {
    let mechanism = sasl.mechanism()?;
    let protocol = if sasl.use_tls { "sasl_ssl" } else { "sasl_plaintext" };
    config
        .set("security.protocol", protocol)
        .set("sasl.mechanism", mechanism.as_str())
        .set("sasl.username", &sasl.user)
        .set("sasl.password", &sasl.password);
    if sasl.use_tls {
        apply_tls(&sasl.tls_config, config);
    }
    Ok(())
}

fn apply_tls(tls: &TlsConfig, config: &mut ClientConfig) {
    if let Some(ca) = &tls.ca_file {
        config.set("ssl.ca.location", ca.display().to_string());
    }
    if let Some(cert) = &tls.cert_file {
        config.set("ssl.certificate.location", cert.display().to_string());
    }
    if let Some(key) = &tls.key_file {
        config.set("ssl.key.location", key.display().to_string());
    }
    if tls.insecure_skip_verify {
        config
            .set("enable.ssl.certificate.verification", "false")
            .set("ssl.endpoint.identification.algorithm", "none");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn test_no_authentication_sets_nothing() {
        let mut config = ClientConfig::new();
        apply(&Authentication::default(), &mut config).unwrap();
        assert_eq!(config.get("security.protocol"), None);
    }

    #[test]
    fn test_ssl_authentication() {
        let auth = Authentication {
            kind: "ssl".to_string(),
            tls_config: TlsConfig {
                ca_file: Some(PathBuf::from("/etc/kafka/ca.pem")),
                insecure_skip_verify: true,
                ..Default::default()
            },
            ..Default::default()
        };
        let mut config = ClientConfig::new();
        apply(&auth, &mut config).unwrap();
        assert_eq!(config.get("security.protocol"), Some("ssl"));
        assert_eq!(config.get("ssl.ca.location"), Some("/etc/kafka/ca.pem"));
        assert_eq!(config.get("enable.ssl.certificate.verification"), Some("false"));
        assert_eq!(config.get("ssl.certificate.location"), None);
    }

    #[test]
    fn test_sasl_authentication() {
        let auth = Authentication {
            kind: "sasl".to_string(),
            sasl_config: SaslConfig {
                user: "alice".to_string(),
                password: "secret".to_string(),
                ..Default::default()
            },
            ..Default::default()
        };
        let mut config = ClientConfig::new();
        apply(&auth, &mut config).unwrap();
        assert_eq!(config.get("security.protocol"), Some("sasl_plaintext"));
        assert_eq!(config.get("sasl.mechanism"), Some("PLAIN"));
        assert_eq!(config.get("sasl.username"), Some("alice"));
    }

    #[test]
    fn test_sasl_over_tls_with_scram() {
        let auth = Authentication {
            kind: "sasl".to_string(),
            sasl_config: SaslConfig {
                mechanism: "SCRAM-SHA-256".to_string(),
                use_tls: true,
                tls_config: TlsConfig {
                    cert_file: Some(PathBuf::from("client.pem")),
                    ..Default::default()
                },
                ..Default::default()
            },
            ..Default::default()
        };
        let mut config = ClientConfig::new();
        apply(&auth, &mut config).unwrap();
        assert_eq!(config.get("security.protocol"), Some("sasl_ssl"));
        assert_eq!(config.get("sasl.mechanism"), Some("SCRAM-SHA-256"));
        assert_eq!(config.get("ssl.certificate.location"), Some("client.pem"));
    }

    #[test]
    fn test_unknown_types_are_rejected() {
        let mut config = ClientConfig::new();
        let auth = Authentication {
            kind: "oauth".to_string(),
            ..Default::default()
        };
        assert!(matches!(
            apply(&auth, &mut config),
            Err(Error::UnsupportedAuthentication(_))
        ));

        let auth = Authentication {
            kind: "sasl".to_string(),
            sasl_config: SaslConfig {
                mechanism: "OAUTHBEARER".to_string(),
                ..Default::default()
            },
            ..Default::default()
        };
        assert!(matches!(
            apply(&auth, &mut config),
            Err(Error::UnsupportedSaslMechanism(_))
        ));
    }
}
