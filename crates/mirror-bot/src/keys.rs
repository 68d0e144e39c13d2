//! Wallet credentials from environment variables.
//!
//! Keys are read once at startup from `WALLET_<N>_PRIVATE_KEY` /
//! `WALLET_<N>_NAME` / `WALLET_<N>_ENABLED` / `WALLET_<N>_MAX_ORDERS`
//! so no private key ever lives in a config file or the repo. Disabled
//! wallets are filtered out at load.

use mirror_core::WalletId;
use std::collections::BTreeMap;
use std::fmt;
use tracing::{info, warn};

const DEFAULT_MAX_ORDERS: usize = 100;

/// Private key material. `Debug` and `Display` never reveal it.
#[derive(Clone, PartialEq, Eq)]
pub struct PrivateKey(String);

impl PrivateKey {
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    /// The raw hex key, for handing to the chain client's signer only.
    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for PrivateKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PrivateKey(***)")
    }
}

/// One wallet as loaded from the environment.
#[derive(Debug, Clone)]
pub struct WalletCredentials {
    pub wallet_id: WalletId,
    pub name: String,
    pub private_key: PrivateKey,
    pub max_open_orders: usize,
}

/// Load enabled wallets from the process environment.
pub fn load_wallets_from_env() -> Vec<WalletCredentials> {
    wallets_from_vars(std::env::vars())
}

/// Pure core of the env loader, fed an explicit variable set.
fn wallets_from_vars(vars: impl Iterator<Item = (String, String)>) -> Vec<WalletCredentials> {
    // BTreeMap keeps wallet ordering stable across runs.
    let mut grouped: BTreeMap<String, BTreeMap<String, String>> = BTreeMap::new();
    for (key, value) in vars {
        let Some(rest) = key.strip_prefix("WALLET_") else {
            continue;
        };
        for field in ["PRIVATE_KEY", "NAME", "ENABLED", "MAX_ORDERS"] {
            if let Some(id) = rest.strip_suffix(&format!("_{field}")) {
                grouped
                    .entry(id.to_string())
                    .or_default()
                    .insert(field.to_string(), value.clone());
                break;
            }
        }
    }

    let mut wallets = Vec::new();
    for (id, fields) in grouped {
        let Some(private_key) = fields.get("PRIVATE_KEY") else {
            warn!(wallet = %id, "wallet has no private key set, skipping");
            continue;
        };
        let enabled = fields
            .get("ENABLED")
            .map(|v| v.eq_ignore_ascii_case("true"))
            .unwrap_or(true);
        if !enabled {
            info!(wallet = %id, "wallet disabled, skipping");
            continue;
        }
        let name = fields
            .get("NAME")
            .cloned()
            .unwrap_or_else(|| format!("Wallet {id}"));
        let max_open_orders = fields
            .get("MAX_ORDERS")
            .and_then(|v| v.parse().ok())
            .unwrap_or(DEFAULT_MAX_ORDERS);

        let wallet_id = WalletId::new(format!("wallet_{}", id.to_lowercase()));
        info!(wallet = %wallet_id, name = %name, max_open_orders, "loaded wallet");
        wallets.push(WalletCredentials {
            wallet_id,
            name,
            private_key: PrivateKey::new(private_key.clone()),
            max_open_orders,
        });
    }
    wallets
}
