use openfhe::cxx::UniquePtr;
use openfhe::ffi;

pub struct PublicKey {
    pub(crate) pk: UniquePtr<ffi::PublicKeyDCRTPoly>,
}

pub struct SecretKey {
    pub(crate) sk: UniquePtr<ffi::PrivateKeyDCRTPoly>,
}

/// Key pair from `CryptoContext::key_gen`. Evaluation keys stay inside the
/// OpenFHE context that generated them.
pub struct KeyPair {
    pub public_key: PublicKey,
    pub secret_key: SecretKey,
}

impl KeyPair {
    pub(crate) fn from_ffi(kp: &ffi::KeyPairDCRTPoly) -> Self {
        KeyPair {
            public_key: PublicKey { pk: kp.GetPublicKey() },
            secret_key: SecretKey { sk: kp.GetPrivateKey() },
        }
    }
}
