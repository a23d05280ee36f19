//! TLS connector plumbing on top of rustls.

use std::sync::Arc;

use rustls::{ClientConfig, OwnedTrustAnchor, RootCertStore, ServerName};

/// Everything a connection needs to establish (and re-establish) TLS.
#[derive(Clone)]
pub(crate) struct TlsConnect {
    pub(crate) config: Arc<ClientConfig>,
    pub(crate) server_name: ServerName,
}

/// Client config trusting the bundled webpki roots.
pub(crate) fn default_config() -> Arc<ClientConfig> {
    let mut roots = RootCertStore::empty();
    roots.add_trust_anchors(webpki_roots::TLS_SERVER_ROOTS.iter().map(|anchor| {
        OwnedTrustAnchor::from_subject_spki_name_constraints(
            anchor.subject,
            anchor.spki,
            anchor.name_constraints,
        )
    }));

    let config = ClientConfig::builder()
        .with_safe_defaults()
        .with_root_certificates(roots)
        .with_no_client_auth();

    Arc::new(config)
}
