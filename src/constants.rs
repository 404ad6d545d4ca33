use alloy::primitives::{address, b256, Address, B256};

// Polygon mainnet
pub const CTF_CONTRACT_ADDRESS: Address = address!("4D97DCd97eC945f40cF65F87097ACe5EA0476045");
pub const COLLATERAL_TOKEN_ADDRESS: Address = address!("2791Bca1f2de4661ED88A30C99A7a9449Aa84174");
pub const REDEEM_INDEX_SETS: [u64; 2] = [1, 2];

// PROXY relaying contracts
pub const PROXY_FACTORY_ADDRESS: Address = address!("aB45c5A4B0c941a2F231C04C3f49182e1A254052");
pub const RELAY_HUB_ADDRESS: Address = address!("D216153c06E857cD7f72665E0aF1d7D82172F494");
pub const PROXY_INIT_CODE_HASH: B256 =
    b256!("d21df8dc65880a8606f09fe0ce3df9b8869287ab0b058be05aa9e8af6330a00b");
pub const PROXY_CALL_TYPE: u8 = 1;
pub const DEFAULT_PROXY_GAS_LIMIT: u64 = 10_000_000;

pub const POLYGON_CHAIN_ID: u64 = 137;

// DEFAULTS
pub const DEFAULT_RELAYER_URL: &str = "https://relayer-v2.polymarket.com";
pub const DEFAULT_RPC_URL: &str = "https://polygon-rpc.com";
pub const DEFAULT_DATA_API_URL: &str = "https://data-api.polymarket.com";
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 2_000;
pub const DEFAULT_MAX_POLLS: u32 = 100;
pub const DEFAULT_LOG_DIR: &str = "logs";

// FILES (relative to the parent of the executable's directory)
pub const ENV_FILE_NAME: &str = ".env";
pub const SETTINGS_FILE_NAME: &str = "claimer.toml";

pub const POSITIONS_PAGE_LIMIT: u32 = 100;
