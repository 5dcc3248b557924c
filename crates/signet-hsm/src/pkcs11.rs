//! PKCS#11-backed signer provider.
//!
//! Opens one authenticated read-write session at construction and keeps it
//! for the life of the process. PKCS#11 sessions are not thread-safe and
//! `SignInit → Sign` must not interleave, so every token call goes through
//! the session mutex.

use std::sync::{Arc, Mutex};

use cryptoki::context::{CInitializeArgs, Pkcs11};
use cryptoki::error::{Error as CkError, RvError};
use cryptoki::mechanism::Mechanism;
use cryptoki::object::{Attribute, AttributeType, KeyType, ObjectClass, ObjectHandle};
use cryptoki::session::{Session, UserType};
use cryptoki::types::AuthPin;
use rsa::pkcs1::EncodeRsaPublicKey;
use rsa::pkcs8::LineEnding;
use rsa::{BigUint, RsaPublicKey};

use crate::{digest_info, HashAlgorithm, HsmError, HsmSigner, SignerProvider};

const RSA_MODULUS_BITS: u64 = 2048;
const RSA_PUBLIC_EXPONENT: [u8; 3] = [0x01, 0x00, 0x01];

/// Connection settings for the PKCS#11 module.
#[derive(Debug, Clone)]
pub struct Pkcs11Config {
    /// Path to the PKCS#11 shared library (e.g. libsofthsm2.so).
    pub module_path: String,

    /// Slot id holding the token.
    pub slot: u64,

    /// User PIN for the token.
    pub pin: String,
}

impl Pkcs11Config {
    /// Read the configuration from `SIGNET_HSM_MODULE`, `SIGNET_HSM_SLOT`
    /// and `SIGNET_HSM_PIN`.
    pub fn from_env() -> Result<Self, HsmError> {
        let module_path = std::env::var("SIGNET_HSM_MODULE")
            .map_err(|_| HsmError::Module("SIGNET_HSM_MODULE is not set".into()))?;
        let slot = std::env::var("SIGNET_HSM_SLOT")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(0);
        let pin = std::env::var("SIGNET_HSM_PIN")
            .map_err(|_| HsmError::Module("SIGNET_HSM_PIN is not set".into()))?;

        Ok(Self {
            module_path,
            slot,
            pin,
        })
    }
}

/// Signer provider backed by a PKCS#11 token.
pub struct Pkcs11SignerProvider {
    ctx: Pkcs11,
    session: Arc<Mutex<Session>>,
}

impl Pkcs11SignerProvider {
    /// Load the module, open a read-write session on the configured slot and
    /// log in with the user PIN.
    pub fn connect(config: &Pkcs11Config) -> Result<Self, HsmError> {
        let ctx = Pkcs11::new(&config.module_path)
            .map_err(|e| HsmError::Module(format!("failed to load module: {e}")))?;
        ctx.initialize(CInitializeArgs::OsThreads)
            .map_err(|e| HsmError::Module(format!("failed to initialize module: {e}")))?;

        let slot = ctx
            .get_slots_with_token()
            .map_err(map_ck_error)?
            .into_iter()
            .find(|s| s.id() == config.slot)
            .ok_or(HsmError::SlotNotFound(config.slot))?;

        let session = ctx.open_rw_session(slot).map_err(map_ck_error)?;
        session
            .login(UserType::User, Some(&AuthPin::new(config.pin.clone())))
            .map_err(map_ck_error)?;

        tracing::info!(slot = config.slot, "Opened authenticated HSM session");

        Ok(Self {
            ctx,
            session: Arc::new(Mutex::new(session)),
        })
    }

    /// Clean shutdown: log out, close the session, finalize the module.
    ///
    /// Outstanding signer handles keep the session alive until dropped.
    pub fn finalize(self) {
        if let Ok(session) = self.session.lock() {
            let _ = session.logout();
        }
        drop(self.session);
        self.ctx.finalize();
        tracing::info!("HSM session closed and module finalized");
    }

    fn find_object(
        session: &Session,
        class: ObjectClass,
        label: &str,
    ) -> Result<Option<ObjectHandle>, HsmError> {
        let template = vec![
            Attribute::Class(class),
            Attribute::Label(label.as_bytes().to_vec()),
        ];
        let handles = session.find_objects(&template).map_err(map_ck_error)?;
        Ok(handles.into_iter().next())
    }

    fn read_public_key_pem(session: &Session, handle: ObjectHandle) -> Result<String, HsmError> {
        let attrs = session
            .get_attributes(
                handle,
                &[AttributeType::Modulus, AttributeType::PublicExponent],
            )
            .map_err(map_ck_error)?;

        let mut modulus = None;
        let mut exponent = None;
        for attr in attrs {
            match attr {
                Attribute::Modulus(m) => modulus = Some(m),
                Attribute::PublicExponent(e) => exponent = Some(e),
                _ => {}
            }
        }

        let (modulus, exponent) = match (modulus, exponent) {
            (Some(m), Some(e)) => (m, e),
            _ => {
                return Err(HsmError::InvalidPublicKey(
                    "token object is missing modulus or exponent".into(),
                ))
            }
        };

        let public_key = RsaPublicKey::new(
            BigUint::from_bytes_be(&modulus),
            BigUint::from_bytes_be(&exponent),
        )
        .map_err(|e| HsmError::InvalidPublicKey(e.to_string()))?;

        public_key
            .to_pkcs1_pem(LineEnding::LF)
            .map_err(|e| HsmError::InvalidPublicKey(e.to_string()))
    }
}

impl SignerProvider for Pkcs11SignerProvider {
    fn generate_key_pair(&self, label: &str) -> Result<String, HsmError> {
        let session = self.session.lock().map_err(|_| HsmError::SessionLost)?;

        if Self::find_object(&session, ObjectClass::PRIVATE_KEY, label)?.is_some() {
            return Err(HsmError::LabelExists(label.to_string()));
        }

        let pub_template = vec![
            Attribute::Class(ObjectClass::PUBLIC_KEY),
            Attribute::KeyType(KeyType::RSA),
            Attribute::Token(true),
            Attribute::Verify(true),
            Attribute::Encrypt(true),
            Attribute::ModulusBits(RSA_MODULUS_BITS.into()),
            Attribute::PublicExponent(RSA_PUBLIC_EXPONENT.to_vec()),
            Attribute::Label(label.as_bytes().to_vec()),
            Attribute::Id(label.as_bytes().to_vec()),
        ];
        let priv_template = vec![
            Attribute::Class(ObjectClass::PRIVATE_KEY),
            Attribute::KeyType(KeyType::RSA),
            Attribute::Token(true),
            Attribute::Sign(true),
            Attribute::Private(true),
            Attribute::Sensitive(true),
            Attribute::Extractable(false),
            Attribute::Label(label.as_bytes().to_vec()),
            Attribute::Id(label.as_bytes().to_vec()),
        ];

        let (pub_handle, _priv_handle) = session
            .generate_key_pair(&Mechanism::RsaPkcsKeyPairGen, &pub_template, &priv_template)
            .map_err(|e| HsmError::KeyGeneration(e.to_string()))?;

        tracing::info!(label, "Generated RSA-2048 key pair in token");

        Self::read_public_key_pem(&session, pub_handle)
    }

    fn find_public_key(&self, label: &str) -> Result<String, HsmError> {
        let session = self.session.lock().map_err(|_| HsmError::SessionLost)?;

        let handle = Self::find_object(&session, ObjectClass::PUBLIC_KEY, label)?
            .ok_or_else(|| HsmError::KeyNotFound(label.to_string()))?;

        Self::read_public_key_pem(&session, handle)
    }

    fn signer_for(&self, label: &str) -> Result<Arc<dyn HsmSigner>, HsmError> {
        let session = self.session.lock().map_err(|_| HsmError::SessionLost)?;

        let priv_handle = Self::find_object(&session, ObjectClass::PRIVATE_KEY, label)?
            .ok_or_else(|| HsmError::KeyNotFound(label.to_string()))?;
        let pub_handle = Self::find_object(&session, ObjectClass::PUBLIC_KEY, label)?
            .ok_or_else(|| HsmError::KeyNotFound(label.to_string()))?;
        let public_key_pem = Self::read_public_key_pem(&session, pub_handle)?;

        drop(session);

        Ok(Arc::new(Pkcs11Signer {
            session: Arc::clone(&self.session),
            key: priv_handle,
            public_key_pem,
        }))
    }
}

/// A signing handle bound to one private key object.
struct Pkcs11Signer {
    session: Arc<Mutex<Session>>,
    key: ObjectHandle,
    public_key_pem: String,
}

impl HsmSigner for Pkcs11Signer {
    fn sign_digest(&self, digest: &[u8], alg: HashAlgorithm) -> Result<Vec<u8>, HsmError> {
        // Raw RSA-PKCS: the token pads, we frame the DigestInfo.
        let framed = digest_info::wrap(digest, alg)?;

        let session = self.session.lock().map_err(|_| HsmError::SessionLost)?;
        session
            .sign(&Mechanism::RsaPkcs, self.key, &framed)
            .map_err(|e| match map_ck_error(e) {
                HsmError::SessionLost => HsmError::SessionLost,
                other => HsmError::Sign(other.to_string()),
            })
    }

    fn public_key_pem(&self) -> &str {
        &self.public_key_pem
    }
}

fn map_ck_error(err: CkError) -> HsmError {
    match err {
        CkError::Pkcs11(
            RvError::SessionClosed | RvError::SessionHandleInvalid | RvError::DeviceRemoved,
            _,
        ) => HsmError::SessionLost,
        other => HsmError::Module(other.to_string()),
    }
}
