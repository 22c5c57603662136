use crate::artifacts::ArtifactDescriptor;
use crate::digest::DigestAlgorithm;
use crate::error::{Error, Result};
use crate::types::CircuitKind;
use path_absolutize::Absolutize;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use url::Url;

const DEFAULT_NAMESPACE: &str = "zk-mahjong";
const DEFAULT_IPFS_GATEWAY: &str = "https://ipfs.io/";

/// Top-level configuration, loaded from a TOML file.
///
/// ```toml
/// data_dir = "./prover-data"
/// ipfs_gateway = "https://ipfs.io/"
///
/// [[session.srs]]
/// degree = 12
/// locator = "ipfs://bafy.../powersOfTau28_hez_final_12.ptau"
/// digest = "9f1c..."
///
/// [[session.circuits]]
/// circuit = "elGamalSecretKey"
/// degree = 12
/// constraint_system = "ipfs://bafy.../elgamal_secret_key.r1cs"
/// witness_generator = "ipfs://bafy.../elgamal_secret_key.wasm"
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProverConfig {
    pub data_dir: PathBuf,
    #[serde(default = "default_namespace")]
    pub namespace: String,
    #[serde(default = "default_ipfs_gateway")]
    pub ipfs_gateway: Url,
    pub session: SessionConfig,
}

fn default_namespace() -> String {
    DEFAULT_NAMESPACE.to_string()
}

fn default_ipfs_gateway() -> Url {
    Url::parse(DEFAULT_IPFS_GATEWAY).expect("default gateway is a valid URL")
}

impl ProverConfig {
    pub fn from_toml_str(raw: &str) -> Result<Self> {
        let mut config: ProverConfig = toml::from_str(raw)?;
        config.data_dir = config.data_dir.absolutize()?.into_owned();
        config.session.validate()?;
        Ok(config)
    }

    pub fn from_toml_file(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        Self::from_toml_str(&raw)
    }
}

/// The setup description carried by the init message: SRS catalog plus
/// per-circuit locators.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct SessionConfig {
    #[serde(default)]
    pub srs: Vec<SrsEntry>,
    #[serde(default)]
    pub circuits: Vec<CircuitSetup>,
}

impl SessionConfig {
    /// Rejects duplicate circuit kinds and duplicate SRS degrees.
    pub fn validate(&self) -> Result<()> {
        let mut degrees = BTreeSet::new();
        for entry in &self.srs {
            if !degrees.insert(entry.degree) {
                return Err(Error::ConfigError(format!(
                    "SRS degree {} listed more than once",
                    entry.degree
                )));
            }
        }
        let mut kinds = BTreeSet::new();
        for setup in &self.circuits {
            if !kinds.insert(setup.circuit) {
                return Err(Error::ConfigError(format!(
                    "Circuit {} configured more than once",
                    setup.circuit
                )));
            }
        }
        Ok(())
    }

    pub fn circuit(&self, kind: CircuitKind) -> Option<&CircuitSetup> {
        self.circuits.iter().find(|setup| setup.circuit == kind)
    }

    /// Descriptor of the shared SRS for `degree`, if the catalog has one.
    pub fn srs_descriptor(&self, degree: u32) -> Option<ArtifactDescriptor> {
        self.srs
            .iter()
            .find(|entry| entry.degree == degree)
            .map(SrsEntry::descriptor)
    }
}

/// One SRS (ptau) file of the catalog, shared by every circuit of its degree.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SrsEntry {
    pub degree: u32,
    pub locator: Url,
    pub digest: String,
    #[serde(default)]
    pub algorithm: DigestAlgorithm,
}

impl SrsEntry {
    pub fn descriptor(&self) -> ArtifactDescriptor {
        ArtifactDescriptor {
            key: srs_key(self.degree),
            remote_locator: self.locator.clone(),
            expected_digest: self.digest.clone(),
            algorithm: self.algorithm,
        }
    }
}

/// Store key of the SRS file for a degree class, zero padded.
pub fn srs_key(degree: u32) -> String {
    format!("ptau_{:02}", degree)
}

/// Setup parameters for one circuit kind.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CircuitSetup {
    pub circuit: CircuitKind,
    pub degree: u32,
    pub constraint_system: Url,
    pub witness_generator: Url,
}
