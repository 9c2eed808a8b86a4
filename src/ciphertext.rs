use openfhe::cxx::UniquePtr;
use openfhe::ffi;

/// Packed plaintext and the number of slots that were filled.
pub struct Plaintext {
    pub(crate) pt: UniquePtr<ffi::Plaintext>,
    pub(crate) len: usize,
}

impl Plaintext {
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

pub struct Ciphertext {
    pub(crate) ct: UniquePtr<ffi::CiphertextDCRTPoly>,
}
