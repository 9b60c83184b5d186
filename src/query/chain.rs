use std::fmt;

use once_cell::sync::Lazy;
use rustc_hash::FxHashMap;
use serde::Serialize;

use crate::error::{QueryError, Result};

/// A network the protocol is deployed on.
///
/// `id` doubles as the schema/table suffix in the warehouse
/// (`{environment}_{id}.fct_..._{id}`), `label` is what charts show.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct Chain {
    pub id: &'static str,
    pub label: &'static str,
}

pub const ETHEREUM: Chain = Chain {
    id: "eth_mainnet",
    label: "Ethereum",
};

pub const BASE: Chain = Chain {
    id: "base_mainnet",
    label: "Base",
};

pub const ARBITRUM: Chain = Chain {
    id: "arbitrum_mainnet",
    label: "Arbitrum",
};

pub const OPTIMISM: Chain = Chain {
    id: "optimism_mainnet",
    label: "Optimism",
};

/// Every known chain, in registry order. Union branches follow this order.
pub const CHAINS: &[Chain] = &[ETHEREUM, BASE, ARBITRUM, OPTIMISM];

static CHAINS_BY_ID: Lazy<FxHashMap<&'static str, Chain>> =
    Lazy::new(|| CHAINS.iter().map(|chain| (chain.id, *chain)).collect());

impl Chain {
    /// Look up a chain by identifier.
    pub fn from_id(id: &str) -> Result<Chain> {
        CHAINS_BY_ID
            .get(id)
            .copied()
            .ok_or_else(|| QueryError::UnsupportedChain(id.to_string()))
    }
}

impl fmt::Display for Chain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.id)
    }
}

/// Which chains a request covers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ChainSelector {
    /// Every chain supporting the metric
    #[default]
    All,
    One(Chain),
}

impl ChainSelector {
    /// Parse a selector, accepting `all`/`All` as the sentinel.
    pub fn parse(value: &str) -> Result<Self> {
        let value = value.trim();
        if value.eq_ignore_ascii_case("all") {
            return Ok(Self::All);
        }
        Chain::from_id(value).map(Self::One)
    }

    pub fn includes(&self, chain: &Chain) -> bool {
        match self {
            Self::All => true,
            Self::One(selected) => selected == chain,
        }
    }
}

impl fmt::Display for ChainSelector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::All => f.write_str("all"),
            Self::One(chain) => chain.fmt(f),
        }
    }
}
