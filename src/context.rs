use std::collections::HashSet;
use std::fmt;

use openfhe::cxx::{CxxVector, UniquePtr};
use openfhe::ffi;
use tracing::{debug, info};

use crate::ciphertext::{Ciphertext, Plaintext};
use crate::error::Error;
use crate::keys::{KeyPair, PublicKey, SecretKey};
use crate::params::{Parameters, Scheme};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Feature {
    /// Key generation, encryption and decryption.
    Pke,
    /// Relinearization and rotation keys.
    KeySwitch,
    /// Homomorphic arithmetic.
    LeveledShe,
}

impl Feature {
    fn to_ffi(self) -> ffi::PKESchemeFeature {
        match self {
            Feature::Pke => ffi::PKESchemeFeature::PKE,
            Feature::KeySwitch => ffi::PKESchemeFeature::KEYSWITCH,
            Feature::LeveledShe => ffi::PKESchemeFeature::LEVELEDSHE,
        }
    }
}

impl fmt::Display for Feature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Feature::Pke => write!(f, "PKE"),
            Feature::KeySwitch => write!(f, "KEYSWITCH"),
            Feature::LeveledShe => write!(f, "LEVELEDSHE"),
        }
    }
}

/// An OpenFHE `CryptoContext<DCRTPoly>` plus the bookkeeping OpenFHE does
/// not report back: enabled features and generated evaluation keys. OpenFHE
/// throws (and the process aborts) on a missing key or disabled feature, so
/// those are checked here and returned as errors instead.
pub struct CryptoContext {
    params: Parameters,
    cc: UniquePtr<ffi::CryptoContextDCRTPoly>,
    ring_dim: usize,
    features: HashSet<Feature>,
    has_mult_key: bool,
    rotation_keys: HashSet<i32>,
}

impl CryptoContext {
    pub fn new(params: Parameters) -> Result<Self, Error> {
        let depth = params.multiplicative_depth as u32;
        let batch_size = params.batch_size as u32;
        let ring_dim = params.ring_dim as u32;
        let security = params.security_level.to_ffi();

        let cc = match params.scheme {
            Scheme::Ckks => {
                let mut p = ffi::GenParamsCKKSRNS();
                p.pin_mut().SetMultiplicativeDepth(depth);
                p.pin_mut().SetScalingModSize(params.scaling_mod_size);
                p.pin_mut().SetSecurityLevel(security);
                if batch_size != 0 {
                    p.pin_mut().SetBatchSize(batch_size);
                }
                if ring_dim != 0 {
                    p.pin_mut().SetRingDim(ring_dim);
                }
                ffi::DCRTPolyGenCryptoContextByParamsCKKSRNS(&p)
            }
            Scheme::Bgv => {
                let mut p = ffi::GenParamsBGVRNS();
                p.pin_mut().SetMultiplicativeDepth(depth);
                p.pin_mut().SetPlaintextModulus(params.plaintext_modulus);
                p.pin_mut().SetSecurityLevel(security);
                if batch_size != 0 {
                    p.pin_mut().SetBatchSize(batch_size);
                }
                if ring_dim != 0 {
                    p.pin_mut().SetRingDim(ring_dim);
                }
                ffi::DCRTPolyGenCryptoContextByParamsBGVRNS(&p)
            }
        };
        if cc.is_null() {
            return Err(Error::InvalidParameters(format!(
                "OpenFHE rejected the {} parameters",
                params.scheme
            )));
        }

        let ring_dim = cc.GetRingDimension() as usize;
        if params.batch_size > ring_dim / 2 {
            return Err(Error::TooManyValues {
                len: params.batch_size,
                capacity: ring_dim / 2,
            });
        }
        info!(
            scheme = %params.scheme,
            ring_dim,
            depth,
            batch_size = params.batch_size,
            "crypto context ready"
        );

        Ok(CryptoContext {
            params,
            cc,
            ring_dim,
            features: HashSet::new(),
            has_mult_key: false,
            rotation_keys: HashSet::new(),
        })
    }

    pub fn enable(&mut self, feature: Feature) {
        if self.features.insert(feature) {
            self.cc.EnableByFeature(feature.to_ffi());
        }
    }

    pub fn is_enabled(&self, feature: Feature) -> bool {
        self.features.contains(&feature)
    }

    fn require(&self, feature: Feature) -> Result<(), Error> {
        if self.is_enabled(feature) {
            Ok(())
        } else {
            Err(Error::FeatureDisabled(feature))
        }
    }

    pub fn params(&self) -> &Parameters {
        &self.params
    }

    pub fn scheme(&self) -> Scheme {
        self.params.scheme
    }

    /// Ring dimension OpenFHE settled on.
    pub fn ring_dim(&self) -> usize {
        self.ring_dim
    }

    pub fn slots(&self) -> usize {
        self.ring_dim / 2
    }

    /// Values packed per plaintext; all slots when no batch size was set.
    pub fn batch_size(&self) -> usize {
        match self.params.batch_size {
            0 => self.slots(),
            b => b,
        }
    }

    pub fn key_gen(&self) -> Result<KeyPair, Error> {
        self.require(Feature::Pke)?;
        let kp = self.cc.KeyGen();
        debug!("key pair generated");
        Ok(KeyPair::from_ffi(&kp))
    }

    pub fn eval_mult_key_gen(&mut self, sk: &SecretKey) -> Result<(), Error> {
        self.require(Feature::KeySwitch)?;
        self.cc.EvalMultKeyGen(&sk.sk);
        self.has_mult_key = true;
        debug!("relinearization key generated");
        Ok(())
    }

    /// Generates keys for every index not seen before. Zero needs no key.
    pub fn eval_rotate_key_gen(&mut self, sk: &SecretKey, indices: &[i64]) -> Result<(), Error> {
        self.require(Feature::KeySwitch)?;
        let mut fresh = CxxVector::<i32>::new();
        for &index in indices {
            let r = self.rotation_index(index)?;
            if r != 0 && self.rotation_keys.insert(r) {
                fresh.pin_mut().push(r);
            }
        }
        if !fresh.is_empty() {
            self.cc
                .EvalRotateKeyGen(&sk.sk, &fresh, &ffi::DCRTPolyGenNullPublicKey());
        }
        debug!(keys = self.rotation_keys.len(), "rotation keys generated");
        Ok(())
    }

    fn rotation_index(&self, index: i64) -> Result<i32, Error> {
        i32::try_from(index)
            .ok()
            .filter(|r| r.unsigned_abs() as usize <= self.slots())
            .ok_or(Error::MissingRotationKey(index))
    }

    /// Packs `values` into the first slots. BGV rounds them to integers.
    pub fn make_packed_plaintext(&self, values: &[f64]) -> Result<Plaintext, Error> {
        if values.len() > self.batch_size() {
            return Err(Error::TooManyValues {
                len: values.len(),
                capacity: self.batch_size(),
            });
        }

        let pt = match self.params.scheme {
            Scheme::Ckks => {
                let mut v = CxxVector::<f64>::new();
                for &x in values {
                    v.pin_mut().push(x);
                }
                self.cc
                    .MakeCKKSPackedPlaintext(&v, 1, 0, &ffi::DCRTPolyGenNullParams(), 0)
            }
            Scheme::Bgv => {
                let mut v = CxxVector::<i64>::new();
                for &x in values {
                    v.pin_mut().push(x.round() as i64);
                }
                self.cc.MakePackedPlaintext(&v, 1, 0)
            }
        };

        Ok(Plaintext { pt, len: values.len() })
    }

    pub fn encrypt(&self, pk: &PublicKey, pt: &Plaintext) -> Result<Ciphertext, Error> {
        self.require(Feature::Pke)?;
        Ok(Ciphertext {
            ct: self.cc.EncryptByPublicKey(&pk.pk, &pt.pt),
        })
    }

    /// Decrypts and returns the first `len` slots.
    pub fn decrypt(&self, sk: &SecretKey, ct: &Ciphertext, len: usize) -> Result<Vec<f64>, Error> {
        self.require(Feature::Pke)?;
        let mut pt = ffi::GenNullPlainText();
        self.cc
            .DecryptByPrivateKeyAndCiphertext(&sk.sk, &ct.ct, pt.pin_mut());
        pt.SetLength(len);

        let values = match self.params.scheme {
            Scheme::Ckks => pt.GetRealPackedValue().iter().copied().collect(),
            Scheme::Bgv => pt.GetPackedValue().iter().map(|&v| v as f64).collect(),
        };
        Ok(values)
    }

    pub fn eval_add(&self, a: &Ciphertext, b: &Ciphertext) -> Result<Ciphertext, Error> {
        self.require(Feature::LeveledShe)?;
        Ok(Ciphertext {
            ct: self.cc.EvalAddByCiphertexts(&a.ct, &b.ct),
        })
    }

    pub fn eval_sub(&self, a: &Ciphertext, b: &Ciphertext) -> Result<Ciphertext, Error> {
        self.require(Feature::LeveledShe)?;
        Ok(Ciphertext {
            ct: self.cc.EvalSubByCiphertexts(&a.ct, &b.ct),
        })
    }

    /// Relinearized product; OpenFHE rescales CKKS results on its own.
    pub fn eval_mult(&self, a: &Ciphertext, b: &Ciphertext) -> Result<Ciphertext, Error> {
        self.require(Feature::LeveledShe)?;
        if !self.has_mult_key {
            return Err(Error::MissingRelinKey);
        }
        Ok(Ciphertext {
            ct: self.cc.EvalMultByCiphertexts(&a.ct, &b.ct),
        })
    }

    /// Slot-wise product with a packed plaintext. Slots the plaintext left
    /// empty are zeroed.
    pub fn eval_mult_plain(&self, ct: &Ciphertext, pt: &Plaintext) -> Result<Ciphertext, Error> {
        self.require(Feature::LeveledShe)?;
        Ok(Ciphertext {
            ct: self.cc.EvalMultByCiphertextAndPlaintext(&ct.ct, &pt.pt),
        })
    }

    /// Multiplies every slot by `value`. BGV requires an integer.
    pub fn eval_mult_scalar(&self, ct: &Ciphertext, value: f64) -> Result<Ciphertext, Error> {
        self.require(Feature::LeveledShe)?;
        match self.params.scheme {
            Scheme::Ckks => Ok(Ciphertext {
                ct: self.cc.EvalMultByCiphertextAndConst(&ct.ct, value),
            }),
            Scheme::Bgv => {
                if !value.is_finite() || value.fract() != 0.0 {
                    return Err(Error::NonIntegralScalar(value));
                }
                let pt = self.make_packed_plaintext(&vec![value; self.batch_size()])?;
                self.eval_mult_plain(ct, &pt)
            }
        }
    }

    /// Rotates the slots left by `index` (negative rotates right).
    pub fn eval_rotate(&self, ct: &Ciphertext, index: i64) -> Result<Ciphertext, Error> {
        self.require(Feature::KeySwitch)?;
        let r = self.rotation_index(index)?;
        if r != 0 && !self.rotation_keys.contains(&r) {
            return Err(Error::MissingRotationKey(index));
        }
        Ok(Ciphertext {
            ct: self.cc.EvalRotate(&ct.ct, r),
        })
    }
}
