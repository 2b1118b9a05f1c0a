//! Credential registration for the secure transport kinds.
//!
//! Credentials go into a platform credential store under fixed security tags
//! before any secure socket is opened. The store keeps them for the life of
//! the process, so registration happens once, not on every reconnect.

/// Tag under which a credential is registered with the store.
pub type SecTag = u32;

/// Tag of the broker CA certificate.
pub const CA_CERT_TAG: SecTag = 1;
/// Tag of the pre-shared key and its identity.
pub const PSK_TAG: SecTag = 2;

/// What a registered credential entry holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum CredentialKind {
    CaCertificate,
    PreSharedKey,
    PreSharedKeyIdentity,
}

/// The security subsystem refused a credential.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct CredentialError {
    pub tag: SecTag,
    pub kind: CredentialKind,
    /// Error code reported by the store.
    pub code: i32,
}

/// A platform credential store (mbedTLS credential table, modem key store, ...).
pub trait CredentialStore {
    /// Registers one credential. On failure the store's error code is returned.
    fn add(&mut self, tag: SecTag, kind: CredentialKind, data: &[u8]) -> Result<(), i32>;
}

/// Pre-shared key credentials.
#[derive(Debug, Clone, Copy)]
pub struct Psk<'a> {
    pub key: &'a [u8],
    pub identity: &'a str,
}

/// The credential material to register; either part may be absent.
#[derive(Debug, Clone, Copy, Default)]
pub struct Credentials<'a> {
    pub ca_certificate: Option<&'a [u8]>,
    pub psk: Option<Psk<'a>>,
}

/// Peer certificate verification policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum PeerVerify {
    None,
    Optional,
    Required,
}

/// TLS parameters of a secure transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TlsConfig<'a> {
    pub peer_verify: PeerVerify,
    /// Tags of the credentials the handshake may use.
    pub sec_tags: &'a [SecTag],
    /// SNI hostname; `None` disables SNI and hostname checks.
    pub hostname: Option<&'a str>,
}

/// Registers `credentials` with `store`, stopping at the first rejection.
///
/// Returns how many entries were registered.
pub fn install_credentials<S: CredentialStore + ?Sized>(
    store: &mut S,
    credentials: &Credentials<'_>,
) -> Result<usize, CredentialError> {
    let mut installed = 0;

    if let Some(cert) = credentials.ca_certificate {
        register(store, CA_CERT_TAG, CredentialKind::CaCertificate, cert)?;
        installed += 1;
    }

    if let Some(psk) = credentials.psk {
        register(store, PSK_TAG, CredentialKind::PreSharedKey, psk.key)?;
        register(
            store,
            PSK_TAG,
            CredentialKind::PreSharedKeyIdentity,
            psk.identity.as_bytes(),
        )?;
        installed += 1;
    }

    Ok(installed)
}

fn register<S: CredentialStore + ?Sized>(
    store: &mut S,
    tag: SecTag,
    kind: CredentialKind,
    data: &[u8],
) -> Result<(), CredentialError> {
    store.add(tag, kind, data).map_err(|code| {
        error!("tls_credential_add({}, {:?}): {}", tag, kind, code);
        CredentialError { tag, kind, code }
    })
}
