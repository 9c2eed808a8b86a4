use std::fmt;

use clap::ValueEnum;
use openfhe::ffi;
use serde::Deserialize;
use tracing::warn;

use crate::error::Error;

pub const MAX_DEPTH: usize = 40;
pub const MIN_RING_DIM: usize = 16;
pub const MAX_RING_DIM: usize = 1 << 17;
/// Bit size OpenFHE gives the first CKKS modulus; the scaling modulus must
/// stay below it.
pub const FIRST_MOD_BITS: u32 = 60;
pub const MIN_SCALING_BITS: u32 = 20;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Scheme {
    Ckks,
    Bgv,
}

impl fmt::Display for Scheme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Scheme::Ckks => write!(f, "CKKS"),
            Scheme::Bgv => write!(f, "BGV"),
        }
    }
}

/// Dataset type 1 selects CKKS and 2 selects BGV; anything else falls back
/// to CKKS.
pub fn select_scheme(dataset_type: i64) -> Scheme {
    match dataset_type {
        1 => Scheme::Ckks,
        2 => Scheme::Bgv,
        other => {
            warn!(dataset_type = other, "invalid dataset type, defaulting to CKKS");
            Scheme::Ckks
        }
    }
}

pub fn is_valid_dataset_type(dataset_type: i64) -> bool {
    matches!(dataset_type, 1 | 2)
}

/// HE-standard security target handed to OpenFHE. `NotSet` disables the
/// ring dimension check and needs an explicit ring dimension.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize, ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum SecurityLevel {
    #[default]
    Classic128,
    Classic192,
    Classic256,
    NotSet,
}

impl SecurityLevel {
    pub(crate) fn to_ffi(self) -> ffi::SecurityLevel {
        match self {
            SecurityLevel::Classic128 => ffi::SecurityLevel::HEStd_128_classic,
            SecurityLevel::Classic192 => ffi::SecurityLevel::HEStd_192_classic,
            SecurityLevel::Classic256 => ffi::SecurityLevel::HEStd_256_classic,
            SecurityLevel::NotSet => ffi::SecurityLevel::HEStd_NotSet,
        }
    }
}

/// Validated context parameters. `scaling_mod_size` is only meaningful for
/// CKKS and `plaintext_modulus` only for BGV. A zero `ring_dim` lets OpenFHE
/// pick the smallest dimension meeting the security level; a zero
/// `batch_size` uses every slot.
///
/// OpenFHE aborts the process on parameter errors, so everything it would
/// reject is caught here first.
#[derive(Clone, Debug, PartialEq)]
pub struct Parameters {
    pub scheme: Scheme,
    pub multiplicative_depth: usize,
    pub scaling_mod_size: u32,
    pub plaintext_modulus: u64,
    pub batch_size: usize,
    pub ring_dim: usize,
    pub security_level: SecurityLevel,
}

impl Parameters {
    pub fn ckks(
        multiplicative_depth: usize,
        scaling_mod_size: u32,
        batch_size: usize,
        ring_dim: usize,
    ) -> Result<Self, Error> {
        Parameters {
            scheme: Scheme::Ckks,
            multiplicative_depth,
            scaling_mod_size,
            plaintext_modulus: 0,
            batch_size,
            ring_dim,
            security_level: SecurityLevel::default(),
        }
        .validate()
    }

    pub fn bgv(
        multiplicative_depth: usize,
        plaintext_modulus: u64,
        batch_size: usize,
        ring_dim: usize,
    ) -> Result<Self, Error> {
        Parameters {
            scheme: Scheme::Bgv,
            multiplicative_depth,
            scaling_mod_size: 0,
            plaintext_modulus,
            batch_size,
            ring_dim,
            security_level: SecurityLevel::default(),
        }
        .validate()
    }

    /// The single "scaling factor" prompt value means the scaling modulus
    /// bit size for CKKS and the plaintext modulus for BGV.
    pub fn from_scaling_factor(
        scheme: Scheme,
        multiplicative_depth: usize,
        scaling_factor: u64,
        batch_size: usize,
        ring_dim: usize,
    ) -> Result<Self, Error> {
        match scheme {
            Scheme::Ckks => {
                let bits = u32::try_from(scaling_factor).map_err(|_| {
                    Error::InvalidParameters(format!("scaling factor {scaling_factor} is not a bit size"))
                })?;
                Parameters::ckks(multiplicative_depth, bits, batch_size, ring_dim)
            }
            Scheme::Bgv => Parameters::bgv(multiplicative_depth, scaling_factor, batch_size, ring_dim),
        }
    }

    pub fn with_security_level(mut self, level: SecurityLevel) -> Result<Self, Error> {
        self.security_level = level;
        self.validate()
    }

    fn validate(self) -> Result<Self, Error> {
        if self.multiplicative_depth == 0 || self.multiplicative_depth > MAX_DEPTH {
            return Err(Error::InvalidParameters(format!(
                "multiplicative depth must be in 1..={MAX_DEPTH}, got {}",
                self.multiplicative_depth
            )));
        }

        if self.ring_dim != 0
            && (!self.ring_dim.is_power_of_two() || !(MIN_RING_DIM..=MAX_RING_DIM).contains(&self.ring_dim))
        {
            return Err(Error::InvalidParameters(format!(
                "ring dimension must be a power of two in {MIN_RING_DIM}..={MAX_RING_DIM}, got {}",
                self.ring_dim
            )));
        }
        if self.ring_dim == 0 && self.security_level == SecurityLevel::NotSet {
            return Err(Error::InvalidParameters(
                "an explicit ring dimension is needed without a security level".to_string(),
            ));
        }

        if self.batch_size != 0 && !self.batch_size.is_power_of_two() {
            return Err(Error::InvalidParameters(format!(
                "batch size must be a power of two, got {}",
                self.batch_size
            )));
        }
        if self.ring_dim != 0 && self.batch_size > self.ring_dim / 2 {
            return Err(Error::InvalidParameters(format!(
                "batch size {} exceeds the {} slots of ring dimension {}",
                self.batch_size,
                self.ring_dim / 2,
                self.ring_dim
            )));
        }

        match self.scheme {
            Scheme::Ckks => {
                if !(MIN_SCALING_BITS..FIRST_MOD_BITS).contains(&self.scaling_mod_size) {
                    return Err(Error::InvalidParameters(format!(
                        "scaling modulus size must be in {MIN_SCALING_BITS}..{FIRST_MOD_BITS} bits, got {}",
                        self.scaling_mod_size
                    )));
                }
            }
            Scheme::Bgv => {
                let t = self.plaintext_modulus;
                if !(3..1 << 32).contains(&t) || !is_prime(t) {
                    return Err(Error::InvalidParameters(format!(
                        "plaintext modulus must be a prime below 2^32, got {t}"
                    )));
                }
                // packed encoding needs 2N-th roots of unity mod t
                let two_n = 2 * self.ring_dim.max(2 * self.batch_size) as u64;
                if two_n > 2 && t % two_n != 1 {
                    return Err(Error::InvalidParameters(format!(
                        "plaintext modulus {t} must be 1 mod {two_n} for packing"
                    )));
                }
            }
        }

        Ok(self)
    }
}

/// Trial division; plaintext moduli are below 2^32.
fn is_prime(n: u64) -> bool {
    n >= 2 && (2..).take_while(|d| d * d <= n).all(|d| n % d != 0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scheme_selection() {
        assert_eq!(select_scheme(1), Scheme::Ckks);
        assert_eq!(select_scheme(2), Scheme::Bgv);
        for other in [0, 3, -1, 42] {
            assert_eq!(select_scheme(other), Scheme::Ckks);
            assert!(!is_valid_dataset_type(other));
        }
        assert_eq!(Scheme::Ckks.to_string(), "CKKS");
        assert_eq!(Scheme::Bgv.to_string(), "BGV");
    }

    #[test]
    fn test_library_chosen_dimensions() {
        let params = Parameters::ckks(6, 50, 8192, 0).unwrap();
        assert_eq!(params.ring_dim, 0);
        assert_eq!(params.batch_size, 8192);
        let params = Parameters::ckks(2, 40, 0, 64).unwrap();
        assert_eq!(params.batch_size, 0);

        // without a security level the dimension has to be given
        assert!(Parameters::ckks(2, 40, 16, 0)
            .unwrap()
            .with_security_level(SecurityLevel::NotSet)
            .is_err());
        assert!(Parameters::ckks(2, 40, 16, 64)
            .unwrap()
            .with_security_level(SecurityLevel::NotSet)
            .is_ok());
    }

    #[test]
    fn test_from_scaling_factor() {
        let ckks = Parameters::from_scaling_factor(Scheme::Ckks, 3, 50, 8, 64).unwrap();
        assert_eq!(ckks.scaling_mod_size, 50);
        let bgv = Parameters::from_scaling_factor(Scheme::Bgv, 3, 65537, 8, 64).unwrap();
        assert_eq!(bgv.plaintext_modulus, 65537);
        assert!(Parameters::from_scaling_factor(Scheme::Ckks, 3, 1 << 40, 8, 64).is_err());
    }

    #[test]
    fn test_rejects_invalid() {
        let bad = [
            Parameters::ckks(0, 50, 8, 64),
            Parameters::ckks(3, 60, 8, 64),
            Parameters::ckks(3, 10, 8, 64),
            Parameters::ckks(3, 40, 24, 64),
            Parameters::ckks(3, 40, 64, 64),
            Parameters::ckks(3, 40, 8, 100),
            Parameters::bgv(3, 65536, 8, 64),
            // 65537 is not 1 mod 2^18
            Parameters::bgv(3, 65537, 8, 1 << 17),
            // nor 1 mod 2^17 once the batch needs 2^16 slots
            Parameters::bgv(3, 65537, 1 << 16, 0),
        ];
        for res in bad {
            assert!(matches!(res, Err(Error::InvalidParameters(_))), "{res:?}");
        }
        assert!(is_prime(65537) && is_prime(7_340_033) && !is_prime(65535));
    }
}
