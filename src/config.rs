//! Run configuration: command-line flags first, then an optional TOML file,
//! then interactive prompts (or defaults with `--no-prompt`).

use std::fs;
use std::io::{BufRead, Write};
use std::path::{Path, PathBuf};
use std::str::FromStr;

use clap::Args;
use serde::Deserialize;

use crate::error::{ConfigError, Error};
use crate::params::{is_valid_dataset_type, select_scheme, Parameters, Scheme, SecurityLevel};
use crate::pipeline::{Arithmetic, PipelineConfig, Reduction};

pub const DEFAULT_API_URL: &str = "http://127.0.0.1:5000/threat_data";
pub const DEFAULT_API_DATASET_SIZE: usize = 10_000;
pub const DEFAULT_SYNTHETIC_DATASET_SIZE: usize = 1_000_000;
pub const DEFAULT_DEPTH: usize = 6;
pub const DEFAULT_BATCH_SIZE: usize = 8192;
pub const DEFAULT_CKKS_SCALING_BITS: u64 = 50;
pub const DEFAULT_BGV_PLAINTEXT_MODULUS: u64 = 65537;
/// Zero lets OpenFHE pick the smallest ring meeting the security level.
pub const DEFAULT_RING_DIM: usize = 0;

const DATASET_TYPE_PROMPT: &str =
    "Select Dataset Type: \n1. Floating-point Threat Scores \n2. Integer-based Threat Counts\n";

#[derive(Clone, Debug, Default, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FileConfig {
    pub dataset_type: Option<i64>,
    pub api_url: Option<String>,
    pub dataset_size: Option<usize>,
    pub multiplicative_depth: Option<usize>,
    pub batch_size: Option<usize>,
    pub scaling_factor: Option<u64>,
    pub ring_dim: Option<usize>,
    pub security_level: Option<SecurityLevel>,
    pub reduction: Option<Reduction>,
    pub arithmetic: Option<Arithmetic>,
    pub variance: Option<bool>,
    pub seed: Option<u64>,
}

impl FileConfig {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        toml::from_str(&text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn load_optional(path: Option<&Path>) -> Result<Self, ConfigError> {
        path.map_or_else(|| Ok(FileConfig::default()), FileConfig::load)
    }
}

#[derive(Args, Clone, Debug, Default)]
pub struct CommonArgs {
    /// Number of values to process
    #[arg(long)]
    pub dataset_size: Option<usize>,

    /// Multiplicative depth of the modulus chain
    #[arg(long)]
    pub depth: Option<usize>,

    /// Slots used per ciphertext (power of two)
    #[arg(long)]
    pub batch_size: Option<usize>,

    /// Scaling modulus bits for CKKS, plaintext modulus for BGV
    #[arg(long)]
    pub scaling_factor: Option<u64>,

    /// Ring dimension N; 0 lets OpenFHE choose
    #[arg(long)]
    pub ring_dim: Option<usize>,

    /// HE-standard security level; `not-set` needs an explicit ring dimension
    #[arg(long, value_enum)]
    pub security_level: Option<SecurityLevel>,

    #[arg(long, value_enum)]
    pub reduction: Option<Reduction>,

    #[arg(long, value_enum)]
    pub arithmetic: Option<Arithmetic>,

    /// TOML file with any of the settings above
    #[arg(long)]
    pub config: Option<PathBuf>,
}

#[derive(Args, Clone, Debug, Default)]
pub struct ApiArgs {
    /// 1 for floating-point scores (CKKS), 2 for integer counts (BGV)
    #[arg(long)]
    pub dataset_type: Option<i64>,

    /// CSV endpoint serving ThreatID,ThreatScore rows
    #[arg(long)]
    pub url: Option<String>,

    /// Also compute variance and standard deviation
    #[arg(long)]
    pub variance: bool,

    /// Use defaults instead of prompting for missing values
    #[arg(long)]
    pub no_prompt: bool,

    #[command(flatten)]
    pub common: CommonArgs,
}

#[derive(Args, Clone, Debug, Default)]
pub struct SyntheticArgs {
    /// Seed for the dataset generator
    #[arg(long)]
    pub seed: Option<u64>,

    #[command(flatten)]
    pub common: CommonArgs,
}

#[derive(Clone, Debug, PartialEq)]
pub struct ApiConfig {
    pub api_url: String,
    pub dataset_size: usize,
    pub pipeline: PipelineConfig,
}

#[derive(Clone, Debug, PartialEq)]
pub struct SyntheticConfig {
    pub dataset_size: usize,
    pub seed: Option<u64>,
    pub pipeline: PipelineConfig,
}

/// Line-oriented prompts over any reader/writer pair.
pub struct Prompter<R, W> {
    input: R,
    output: W,
    interactive: bool,
}

impl<R: BufRead, W: Write> Prompter<R, W> {
    pub fn new(input: R, output: W, interactive: bool) -> Self {
        Prompter {
            input,
            output,
            interactive,
        }
    }

    pub fn say(&mut self, line: &str) -> Result<(), ConfigError> {
        writeln!(self.output, "{line}")?;
        Ok(())
    }

    /// `preset` wins; otherwise the user is asked, and empty input or end of
    /// input falls back to `default`.
    pub fn value<T: FromStr>(
        &mut self,
        field: &'static str,
        prompt: &str,
        preset: Option<T>,
        default: Option<T>,
    ) -> Result<T, ConfigError> {
        if let Some(value) = preset {
            return Ok(value);
        }
        if !self.interactive {
            return default.ok_or(ConfigError::Missing(field));
        }

        write!(self.output, "{prompt}")?;
        self.output.flush()?;
        let mut line = String::new();
        self.input.read_line(&mut line)?;
        let line = line.trim();
        if line.is_empty() {
            return default.ok_or(ConfigError::Missing(field));
        }
        line.parse().map_err(|_| ConfigError::InvalidValue {
            field,
            value: line.to_string(),
        })
    }

    pub fn into_output(self) -> W {
        self.output
    }
}

pub fn resolve_api<R: BufRead, W: Write>(
    args: &ApiArgs,
    file: FileConfig,
    prompter: &mut Prompter<R, W>,
) -> Result<ApiConfig, Error> {
    let common = &args.common;

    let dataset_type = prompter.value(
        "dataset_type",
        DATASET_TYPE_PROMPT,
        args.dataset_type.or(file.dataset_type),
        Some(1),
    )?;
    if !is_valid_dataset_type(dataset_type) {
        prompter.say("Invalid selection. Defaulting to CKKS.")?;
    }
    let scheme = select_scheme(dataset_type);
    prompter.say(&format!("Selected Encryption Scheme: {scheme}"))?;

    let api_url = prompter.value(
        "api_url",
        "Enter API URL for Threat Intelligence Data: ",
        args.url.clone().or(file.api_url),
        Some(DEFAULT_API_URL.to_string()),
    )?;
    let dataset_size = prompter.value(
        "dataset_size",
        "Enter dataset size (10000 - 10000000): ",
        common.dataset_size.or(file.dataset_size),
        Some(DEFAULT_API_DATASET_SIZE),
    )?;
    let depth = prompter.value(
        "multiplicative_depth",
        "Enter multiplicative depth (default: 6): ",
        common.depth.or(file.multiplicative_depth),
        Some(DEFAULT_DEPTH),
    )?;
    let batch_size = prompter.value(
        "batch_size",
        "Enter batch size (default: 8192): ",
        common.batch_size.or(file.batch_size),
        Some(DEFAULT_BATCH_SIZE),
    )?;
    let scaling_factor = prompter.value(
        "scaling_factor",
        "Enter scaling factor (default: 50 for CKKS, 65537 for BGV): ",
        common.scaling_factor.or(file.scaling_factor),
        Some(default_scaling_factor(scheme)),
    )?;
    let ring_dim = prompter.value(
        "ring_dim",
        "Choose Lattice Size (8192 / 16384 / 32768): ",
        common.ring_dim.or(file.ring_dim),
        Some(DEFAULT_RING_DIM),
    )?;
    let security_level = common.security_level.or(file.security_level).unwrap_or_default();

    let pipeline = PipelineConfig {
        params: Parameters::from_scaling_factor(scheme, depth, scaling_factor, batch_size, ring_dim)?
            .with_security_level(security_level)?,
        reduction: common.reduction.or(file.reduction).unwrap_or_default(),
        arithmetic: common.arithmetic.or(file.arithmetic).unwrap_or_default(),
        variance: args.variance || file.variance.unwrap_or(false),
    };
    pipeline.validate()?;

    Ok(ApiConfig {
        api_url,
        dataset_size,
        pipeline,
    })
}

/// The synthetic run is always CKKS and never prompts.
pub fn resolve_synthetic(args: &SyntheticArgs, file: FileConfig) -> Result<SyntheticConfig, Error> {
    let common = &args.common;
    let depth = common.depth.or(file.multiplicative_depth).unwrap_or(DEFAULT_DEPTH);
    let scaling_factor = common
        .scaling_factor
        .or(file.scaling_factor)
        .unwrap_or(DEFAULT_CKKS_SCALING_BITS);
    let batch_size = common.batch_size.or(file.batch_size).unwrap_or(DEFAULT_BATCH_SIZE);
    let ring_dim = common.ring_dim.or(file.ring_dim).unwrap_or(DEFAULT_RING_DIM);
    let security_level = common.security_level.or(file.security_level).unwrap_or_default();

    let pipeline = PipelineConfig {
        params: Parameters::from_scaling_factor(Scheme::Ckks, depth, scaling_factor, batch_size, ring_dim)?
            .with_security_level(security_level)?,
        reduction: common.reduction.or(file.reduction).unwrap_or_default(),
        arithmetic: common.arithmetic.or(file.arithmetic).unwrap_or_default(),
        variance: true,
    };
    pipeline.validate()?;

    Ok(SyntheticConfig {
        dataset_size: common
            .dataset_size
            .or(file.dataset_size)
            .unwrap_or(DEFAULT_SYNTHETIC_DATASET_SIZE),
        seed: args.seed.or(file.seed),
        pipeline,
    })
}

fn default_scaling_factor(scheme: Scheme) -> u64 {
    match scheme {
        Scheme::Ckks => DEFAULT_CKKS_SCALING_BITS,
        Scheme::Bgv => DEFAULT_BGV_PLAINTEXT_MODULUS,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn prompter(input: &str) -> Prompter<Cursor<Vec<u8>>, Vec<u8>> {
        Prompter::new(Cursor::new(input.as_bytes().to_vec()), Vec::new(), true)
    }

    #[test]
    fn test_prompted_bgv_run() {
        let mut p = prompter("2\nhttp://example.test/data\n500\n3\n\n\n\n");
        let config = resolve_api(&ApiArgs::default(), FileConfig::default(), &mut p).unwrap();

        assert_eq!(config.api_url, "http://example.test/data");
        assert_eq!(config.dataset_size, 500);
        let params = &config.pipeline.params;
        assert_eq!(params.scheme, Scheme::Bgv);
        assert_eq!(params.multiplicative_depth, 3);
        assert_eq!(params.batch_size, DEFAULT_BATCH_SIZE);
        assert_eq!(params.plaintext_modulus, 65537);
        assert_eq!(params.ring_dim, DEFAULT_RING_DIM);
        assert_eq!(params.security_level, SecurityLevel::Classic128);

        let output = String::from_utf8(p.into_output()).unwrap();
        assert!(output.starts_with(DATASET_TYPE_PROMPT));
        assert!(output.contains("Selected Encryption Scheme: BGV\n"));
        assert!(output.contains("Choose Lattice Size (8192 / 16384 / 32768): "));
    }

    #[test]
    fn test_invalid_dataset_type_defaults_to_ckks() {
        let mut p = prompter("7\n");
        let config = resolve_api(&ApiArgs::default(), FileConfig::default(), &mut p).unwrap();
        assert_eq!(config.pipeline.params.scheme, Scheme::Ckks);
        assert_eq!(config.pipeline.params.scaling_mod_size, 50);

        let output = String::from_utf8(p.into_output()).unwrap();
        assert!(output.contains("Invalid selection. Defaulting to CKKS.\nSelected Encryption Scheme: CKKS\n"));
    }

    #[test]
    fn test_flags_beat_file_beat_defaults() {
        let args = ApiArgs {
            no_prompt: true,
            common: CommonArgs {
                depth: Some(4),
                ..CommonArgs::default()
            },
            ..ApiArgs::default()
        };
        let file = FileConfig {
            multiplicative_depth: Some(9),
            batch_size: Some(1024),
            reduction: Some(Reduction::Linear),
            ..FileConfig::default()
        };
        let mut p = Prompter::new(Cursor::new(Vec::new()), Vec::new(), false);
        let config = resolve_api(&args, file, &mut p).unwrap();

        assert_eq!(config.pipeline.params.multiplicative_depth, 4);
        assert_eq!(config.pipeline.params.batch_size, 1024);
        assert_eq!(config.pipeline.reduction, Reduction::Linear);
        assert_eq!(config.pipeline.arithmetic, Arithmetic::Corrected);
        assert_eq!(config.api_url, DEFAULT_API_URL);
        assert_eq!(config.dataset_size, DEFAULT_API_DATASET_SIZE);
    }

    #[test]
    fn test_bad_input_is_reported() {
        let mut p = prompter("1\nhttp://x\nlots\n");
        match resolve_api(&ApiArgs::default(), FileConfig::default(), &mut p) {
            Err(Error::Config(ConfigError::InvalidValue { field, value })) => {
                assert_eq!(field, "dataset_size");
                assert_eq!(value, "lots");
            }
            other => panic!("unexpected {other:?}"),
        }

        // 4096 slots cannot hold the default batch of 8192
        let mut p = prompter("1\n\n\n\n\n\n8192\n");
        assert!(matches!(
            resolve_api(&ApiArgs::default(), FileConfig::default(), &mut p),
            Err(Error::InvalidParameters(_))
        ));
    }

    #[test]
    fn test_file_config_parses() {
        let text = r#"
            dataset_type = 2
            api_url = "http://localhost:5000/threat_data"
            batch_size = 4096
            reduction = "linear"
            arithmetic = "legacy"
            security_level = "classic192"
            variance = true
        "#;
        let file: FileConfig = toml::from_str(text).unwrap();
        assert_eq!(file.dataset_type, Some(2));
        assert_eq!(file.batch_size, Some(4096));
        assert_eq!(file.reduction, Some(Reduction::Linear));
        assert_eq!(file.arithmetic, Some(Arithmetic::Legacy));
        assert_eq!(file.variance, Some(true));
        assert_eq!(file.security_level, Some(SecurityLevel::Classic192));
        assert_eq!(file.seed, None);

        assert!(toml::from_str::<FileConfig>("unknown_key = 1").is_err());
        assert!(matches!(
            FileConfig::load(Path::new("/nonexistent/threatfhe.toml")),
            Err(ConfigError::Read { .. })
        ));
        assert_eq!(FileConfig::load_optional(None).unwrap(), FileConfig::default());
    }

    #[test]
    fn test_synthetic_defaults() {
        let config = resolve_synthetic(&SyntheticArgs::default(), FileConfig::default()).unwrap();
        assert_eq!(config.dataset_size, DEFAULT_SYNTHETIC_DATASET_SIZE);
        assert_eq!(config.seed, None);
        let params = &config.pipeline.params;
        assert_eq!(params.scheme, Scheme::Ckks);
        assert_eq!(params.multiplicative_depth, 6);
        assert_eq!(params.scaling_mod_size, 50);
        assert_eq!(params.batch_size, 8192);
        assert_eq!(params.ring_dim, 0);
        assert!(config.pipeline.variance);

        // an unchecked security level has no ring dimension to fall back on
        let file = FileConfig {
            security_level: Some(SecurityLevel::NotSet),
            ..FileConfig::default()
        };
        assert!(matches!(
            resolve_synthetic(&SyntheticArgs::default(), file.clone()),
            Err(Error::InvalidParameters(_))
        ));
        let file = FileConfig {
            ring_dim: Some(1 << 15),
            ..file
        };
        let config = resolve_synthetic(&SyntheticArgs::default(), file).unwrap();
        assert_eq!(config.pipeline.params.security_level, SecurityLevel::NotSet);
        assert_eq!(config.pipeline.params.ring_dim, 1 << 15);

        let args = SyntheticArgs {
            seed: Some(5),
            common: CommonArgs {
                depth: Some(1),
                ..CommonArgs::default()
            },
        };
        assert!(matches!(
            resolve_synthetic(&args, FileConfig::default()),
            Err(Error::InsufficientDepth { required: 2, available: 1 })
        ));
    }
}
