use std::{fs, path::Path, str::FromStr};

use anyhow::Context;
use serde::Deserialize;
use shared::{
    config::{
        ChainDefinition, MintAppConfig, MintVariant, Timings, DEFAULT_ACKNOWLEDGEMENT,
        DEFAULT_CONNECTOR, DEFAULT_CONTRACT,
    },
    domain::{Address, ChainId, ConnectorId, FIXED_SUPPLY_QUANTITIES, FREE_MINT_WALLET_CAP, U256},
    error::ConfigError,
};

pub const DEFAULT_CONFIG_FILE: &str = "minter.toml";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VariantKind {
    FixedSupply,
    FreeMint,
}

impl FromStr for VariantKind {
    type Err = ConfigError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "fixed_supply" => Ok(Self::FixedSupply),
            "free_mint" => Ok(Self::FreeMint),
            _ => Err(ConfigError::InvalidValue {
                field: "variant",
                value: raw.to_string(),
            }),
        }
    }
}

/// Flat, string-friendly settings as layered from defaults, file and env.
/// Turned into the typed [`MintAppConfig`] once at startup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    pub title: String,
    pub contract: String,
    pub chain_id: u64,
    pub rpc_url: String,
    pub connectors: Vec<String>,
    pub variant: VariantKind,
    pub quantities: Vec<u64>,
    pub wallet_cap: u64,
    pub price_wei: String,
    pub supply_poll_ms: u64,
    pub post_mint_refresh_ms: Vec<u64>,
    pub reconnect_ms: u64,
    pub embedded_in_frame: bool,
    pub acknowledgement: String,
}

impl Default for Settings {
    fn default() -> Self {
        let chain = ChainDefinition::base();
        let timings = Timings::default();
        Self {
            title: "EWCL".into(),
            contract: DEFAULT_CONTRACT.into(),
            chain_id: chain.id.0,
            rpc_url: chain.rpc_url,
            connectors: vec![DEFAULT_CONNECTOR.into()],
            variant: VariantKind::FixedSupply,
            quantities: FIXED_SUPPLY_QUANTITIES.to_vec(),
            wallet_cap: FREE_MINT_WALLET_CAP,
            price_wei: "0".into(),
            supply_poll_ms: timings.supply_poll_ms,
            post_mint_refresh_ms: timings.post_mint_refresh_ms,
            reconnect_ms: timings.reconnect_ms,
            embedded_in_frame: true,
            acknowledgement: DEFAULT_ACKNOWLEDGEMENT.into(),
        }
    }
}

/// Shape of `minter.toml`; every key is optional.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct FileSettings {
    title: Option<String>,
    contract: Option<String>,
    chain_id: Option<u64>,
    rpc_url: Option<String>,
    connectors: Option<Vec<String>>,
    variant: Option<VariantKind>,
    quantities: Option<Vec<u64>>,
    wallet_cap: Option<u64>,
    price_wei: Option<String>,
    supply_poll_ms: Option<u64>,
    post_mint_refresh_ms: Option<Vec<u64>>,
    reconnect_ms: Option<u64>,
    embedded_in_frame: Option<bool>,
    acknowledgement: Option<String>,
}

/// Defaults, then the TOML file, then `APP__*`/`MINTER__*` environment
/// variables. An explicit `path` must exist; the default
/// `minter.toml` is optional.
pub fn load_settings(path: Option<&Path>) -> anyhow::Result<Settings> {
    let mut settings = Settings::default();

    let file = path.unwrap_or_else(|| Path::new(DEFAULT_CONFIG_FILE));
    match fs::read_to_string(file) {
        Ok(raw) => settings
            .apply_file(&raw)
            .with_context(|| format!("failed to parse {}", file.display()))?,
        Err(err) if path.is_some() => {
            return Err(err).with_context(|| format!("failed to read {}", file.display()));
        }
        Err(_) => {}
    }

    settings.apply_env(|key| std::env::var(key).ok())?;
    Ok(settings)
}

fn parse_env<T: FromStr>(field: &'static str, raw: &str) -> Result<T, ConfigError> {
    raw.trim().parse().map_err(|_| ConfigError::InvalidValue {
        field,
        value: raw.to_string(),
    })
}

fn parse_list(field: &'static str, raw: &str) -> Result<Vec<u64>, ConfigError> {
    raw.split(',')
        .filter(|item| !item.trim().is_empty())
        .map(|item| parse_env(field, item))
        .collect()
}

impl Settings {
    pub fn apply_file(&mut self, raw: &str) -> anyhow::Result<()> {
        let file: FileSettings = toml::from_str(raw)?;
        if let Some(v) = file.title {
            self.title = v;
        }
        if let Some(v) = file.contract {
            self.contract = v;
        }
        if let Some(v) = file.chain_id {
            self.chain_id = v;
        }
        if let Some(v) = file.rpc_url {
            self.rpc_url = v;
        }
        if let Some(v) = file.connectors {
            self.connectors = v;
        }
        if let Some(v) = file.variant {
            self.variant = v;
        }
        if let Some(v) = file.quantities {
            self.quantities = v;
        }
        if let Some(v) = file.wallet_cap {
            self.wallet_cap = v;
        }
        if let Some(v) = file.price_wei {
            self.price_wei = v;
        }
        if let Some(v) = file.supply_poll_ms {
            self.supply_poll_ms = v;
        }
        if let Some(v) = file.post_mint_refresh_ms {
            self.post_mint_refresh_ms = v;
        }
        if let Some(v) = file.reconnect_ms {
            self.reconnect_ms = v;
        }
        if let Some(v) = file.embedded_in_frame {
            self.embedded_in_frame = v;
        }
        if let Some(v) = file.acknowledgement {
            self.acknowledgement = v;
        }
        Ok(())
    }

    /// Applies overrides from `lookup`. `MINTER__<KEY>` wins over `APP__<KEY>`.
    pub fn apply_env(
        &mut self,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<(), ConfigError> {
        let read = |key: &str| {
            let app = lookup(&format!("APP__{key}"));
            lookup(&format!("MINTER__{key}")).or(app)
        };

        if let Some(v) = read("CONTRACT") {
            self.contract = v;
        }
        if let Some(v) = read("CHAIN_ID") {
            self.chain_id = parse_env("chain_id", &v)?;
        }
        if let Some(v) = read("RPC_URL") {
            self.rpc_url = v;
        }
        if let Some(v) = read("CONNECTORS") {
            self.connectors = v
                .split(',')
                .map(str::trim)
                .filter(|id| !id.is_empty())
                .map(str::to_string)
                .collect();
        }
        if let Some(v) = read("VARIANT") {
            self.variant = v.parse()?;
        }
        if let Some(v) = read("QUANTITIES") {
            self.quantities = parse_list("quantities", &v)?;
        }
        if let Some(v) = read("WALLET_CAP") {
            self.wallet_cap = parse_env("wallet_cap", &v)?;
        }
        if let Some(v) = read("PRICE_WEI") {
            self.price_wei = v;
        }
        if let Some(v) = read("SUPPLY_POLL_MS") {
            self.supply_poll_ms = parse_env("supply_poll_ms", &v)?;
        }
        if let Some(v) = read("POST_MINT_REFRESH_MS") {
            self.post_mint_refresh_ms = parse_list("post_mint_refresh_ms", &v)?;
        }
        if let Some(v) = read("RECONNECT_MS") {
            self.reconnect_ms = parse_env("reconnect_ms", &v)?;
        }
        if let Some(v) = read("EMBEDDED_IN_FRAME") {
            self.embedded_in_frame = parse_env("embedded_in_frame", &v)?;
        }
        Ok(())
    }

    pub fn into_app_config(self) -> Result<MintAppConfig, ConfigError> {
        let contract: Address = parse_env("contract", &self.contract)?;
        let variant = match self.variant {
            VariantKind::FixedSupply => MintVariant::FixedSupply {
                quantities: self.quantities,
            },
            VariantKind::FreeMint => MintVariant::FreeMint {
                wallet_cap: self.wallet_cap,
                price_wei: parse_env::<U256>("price_wei", &self.price_wei)?,
            },
        };

        let mut chain = ChainDefinition::base();
        if chain.id.0 != self.chain_id {
            chain.id = ChainId(self.chain_id);
            chain.name = format!("Chain {}", self.chain_id);
            chain.block_explorer = None;
        }
        chain.rpc_url = self.rpc_url;

        let config = MintAppConfig {
            title: self.title,
            chain,
            connectors: self.connectors.into_iter().map(ConnectorId::new).collect(),
            contract,
            variant,
            timings: Timings {
                supply_poll_ms: self.supply_poll_ms,
                post_mint_refresh_ms: self.post_mint_refresh_ms,
                reconnect_ms: self.reconnect_ms,
            },
            embedded_in_frame: self.embedded_in_frame,
            acknowledgement: self.acknowledgement,
        };
        config.validate()?;
        Ok(config)
    }
}

#[cfg(test)]
#[path = "tests/config_tests.rs"]
mod tests;
