/// Tokens granted once, at registration.
pub const SIGNUP_BONUS: i64 = 1000;

/// Tokens credited to the referrer for each referred wallet.
pub const REFERRAL_REWARD: i64 = 500;

/// Airdrop allocation used for `tokensRemaining`.
pub const DEFAULT_TOTAL_SUPPLY: i64 = 10_000_000;

/// Wallet addresses are base58 strings of exactly this length.
pub const WALLET_ADDRESS_LEN: usize = 44;

/// Base58 alphabet: digits and letters without `0`, `O`, `I`, `l`.
pub const BASE58_ALPHABET: &str = "123456789ABCDEFGHJKLMNPQRSTUVWXYZabcdefghijkmnopqrstuvwxyz";

/// Wallet extensions the airdrop accepts.
pub const WALLET_TYPES: [&str; 3] = ["phantom", "solflare", "backpack"];

/// Referral codes
pub const REFERRAL_CODE_PREFIX: &str = "REGRET";
pub const REFERRAL_CODE_FRAGMENT_LEN: usize = 8;
pub const REFERRAL_CODE_MIN_LEN: usize = 5;
pub const REFERRAL_CODE_MAX_LEN: usize = 20;
pub const MAX_CODE_ATTEMPTS: usize = 5;
pub const REFERRAL_CODE_SUFFIX_CHARSET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";

/// Registration transaction is retried this many times when a concurrent
/// registration claims the same referral code between check and insert.
pub const REGISTER_TX_ATTEMPTS: usize = 2;

/// Prize wheel: (amount, weight). Weights sum to 100.
pub const PRIZE_TABLE: [(i64, u32); 6] = [
    (100, 30),
    (250, 25),
    (500, 20),
    (750, 15),
    (1000, 8),
    (1500, 2),
];

/// Referral listing pagination
pub const REFERRALS_DEFAULT_LIMIT: i64 = 100;
pub const REFERRALS_MAX_LIMIT: i64 = 500;

/// Column limits for free-text registration metadata.
pub const SESSION_ID_MAX_LEN: usize = 50;
pub const UTM_MAX_LEN: usize = 100;
pub const FREE_TEXT_MAX_LEN: usize = 1000;

/// Admin purge keeps this many days of spins and analytics by default.
pub const DEFAULT_RETENTION_DAYS: i64 = 30;
pub const MAX_RETENTION_DAYS: i64 = 3650;

/// Admin dashboard list sizes and the "active session" window.
pub const DASHBOARD_TOP_REFERRERS: i64 = 10;
pub const DASHBOARD_RECENT_REGISTRATIONS: i64 = 20;
pub const ACTIVE_SESSION_WINDOW_MINUTES: i64 = 60;

/// The stats table holds exactly one row with this id.
pub const GLOBAL_STATS_ID: i32 = 1;

/// Figures served by `/stats` when the store cannot be read.
pub mod fallback {
    pub const TOTAL_PARTICIPANTS: i64 = 1875;
    pub const TOKENS_RESERVED: i64 = 3_875_000;
    pub const PARTICIPANTS_TODAY: i64 = 42;
    pub const TOTAL_SPINS: i64 = 0;
    pub const DAYS_TO_LAUNCH: i64 = 14;
}

pub const SERVICE_NAME: &str = "$REGRET Airdrop API";
