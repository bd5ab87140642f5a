//! DDL for the Postgres backend. Statements run one at a time because the
//! extended query protocol rejects multi-statement strings.

pub(super) const STATEMENTS: &[&str] = &[
    r#"CREATE TABLE IF NOT EXISTS participants (
        id BIGSERIAL PRIMARY KEY,
        wallet_address VARCHAR(44) NOT NULL,
        wallet_type VARCHAR(20) NOT NULL,
        referral_code VARCHAR(20) NOT NULL,
        tokens BIGINT NOT NULL DEFAULT 0,
        total_spins BIGINT NOT NULL DEFAULT 0,
        last_spin DATE,
        referral_count BIGINT NOT NULL DEFAULT 0,
        referral_earned BIGINT NOT NULL DEFAULT 0,
        session_id VARCHAR(50),
        user_agent TEXT,
        referrer TEXT,
        utm_source VARCHAR(100),
        utm_medium VARCHAR(100),
        utm_campaign VARCHAR(100),
        registered_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
        last_active TIMESTAMPTZ NOT NULL DEFAULT NOW(),
        CONSTRAINT participants_wallet_address_key UNIQUE (wallet_address),
        CONSTRAINT participants_referral_code_key UNIQUE (referral_code),
        CONSTRAINT participants_tokens_check CHECK (tokens >= 0)
    )"#,
    r#"CREATE TABLE IF NOT EXISTS referrals (
        id BIGSERIAL PRIMARY KEY,
        referrer_wallet VARCHAR(44) NOT NULL,
        referred_wallet VARCHAR(44) NOT NULL,
        referral_code VARCHAR(20) NOT NULL,
        tokens_awarded BIGINT NOT NULL DEFAULT 500,
        created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
        CONSTRAINT referrals_referred_wallet_key UNIQUE (referred_wallet),
        CONSTRAINT referrals_referrer_wallet_fkey FOREIGN KEY (referrer_wallet)
            REFERENCES participants (wallet_address) ON DELETE CASCADE,
        CONSTRAINT referrals_referred_wallet_fkey FOREIGN KEY (referred_wallet)
            REFERENCES participants (wallet_address) ON DELETE CASCADE
    )"#,
    r#"CREATE TABLE IF NOT EXISTS wheel_spins (
        id BIGSERIAL PRIMARY KEY,
        wallet_address VARCHAR(44) NOT NULL,
        prize_amount BIGINT NOT NULL,
        spin_date DATE NOT NULL,
        created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
        CONSTRAINT wheel_spins_wallet_day_key UNIQUE (wallet_address, spin_date),
        CONSTRAINT wheel_spins_wallet_address_fkey FOREIGN KEY (wallet_address)
            REFERENCES participants (wallet_address) ON DELETE CASCADE
    )"#,
    r#"CREATE TABLE IF NOT EXISTS analytics_events (
        id BIGSERIAL PRIMARY KEY,
        event_name VARCHAR(100) NOT NULL,
        session_id VARCHAR(50),
        wallet_address VARCHAR(44),
        event_data JSONB,
        user_agent TEXT,
        referrer TEXT,
        created_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
    )"#,
    r#"CREATE TABLE IF NOT EXISTS global_stats (
        id INTEGER PRIMARY KEY,
        total_participants BIGINT NOT NULL DEFAULT 0,
        tokens_reserved BIGINT NOT NULL DEFAULT 0,
        participants_today BIGINT NOT NULL DEFAULT 0,
        total_spins BIGINT NOT NULL DEFAULT 0,
        updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
    )"#,
    "CREATE INDEX IF NOT EXISTS idx_participants_registered_at ON participants (registered_at)",
    "CREATE INDEX IF NOT EXISTS idx_referrals_referrer ON referrals (referrer_wallet, created_at DESC)",
    "CREATE INDEX IF NOT EXISTS idx_wheel_spins_spin_date ON wheel_spins (spin_date)",
    "CREATE INDEX IF NOT EXISTS idx_analytics_events_created_at ON analytics_events (created_at)",
    "CREATE INDEX IF NOT EXISTS idx_analytics_events_name ON analytics_events (event_name)",
    "INSERT INTO global_stats (id) VALUES (1) ON CONFLICT (id) DO NOTHING",
];
