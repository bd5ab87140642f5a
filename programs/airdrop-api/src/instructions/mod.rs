pub mod add_referral;
pub mod admin;
pub mod admin_dashboard;
pub mod health;
pub mod lookup_referral_code;
pub mod referrals_for_wallet;
pub mod register;
pub mod spin;
pub mod stats;
pub mod utils;

pub use utils::*;
