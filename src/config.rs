// src/config.rs

/// Validator delegation-fee shares are parts per million.
pub const PERCENT_DENOMINATOR: u32 = 1_000_000;

const SECONDS_PER_YEAR: u64 = 365 * 24 * 60 * 60;

/// All staking tunables, passed by reference into every executor call.
/// There is deliberately no global/static instance.
#[derive(Clone, Debug)]
pub struct Config {
    pub min_validator_stake: u64,
    pub min_delegator_stake: u64,
    /// Minimum / maximum staking period, in seconds.
    pub min_stake_duration: u64,
    pub max_stake_duration: u64,
    /// A validator's total weight may not exceed `factor * own weight`.
    pub max_validator_weight_factor: u64,
    /// Optional absolute cap on a validator's total weight.
    pub max_stake_cap: Option<u64>,
    /// A staker may not be scheduled further than this past chain time.
    pub max_future_start_window: u64,
    pub add_staker_tx_fee: u64,
    pub create_subnet_tx_fee: u64,
    pub create_chain_tx_fee: u64,
    pub reward: RewardParams,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            min_validator_stake: 2_000,
            min_delegator_stake: 25,
            min_stake_duration: 24 * 60 * 60,
            max_stake_duration: SECONDS_PER_YEAR,
            max_validator_weight_factor: 5,
            max_stake_cap: Some(3_000_000),
            max_future_start_window: 24 * 60 * 60,
            add_staker_tx_fee: 10,
            create_subnet_tx_fee: 100,
            create_chain_tx_fee: 100,
            reward: RewardParams::default(),
        }
    }
}

/// Parameters of the potential-reward formula. A staker's reward is fixed
/// at admission from the parameters in force at that moment; already
/// admitted stakers are never re-priced.
#[derive(Clone, Copy, Debug)]
pub struct RewardParams {
    /// Simple annual rate in basis points applied pro rata to the staking
    /// period: reward = weight * duration * rate_bps / (10_000 * year).
    pub annual_rate_bps: u64,
}

impl Default for RewardParams {
    fn default() -> Self {
        Self { annual_rate_bps: 800 } // 8% per year
    }
}

impl RewardParams {
    /// Reward owed at end of a staking period of `duration` seconds for
    /// `weight` staked tokens. Saturates at u64::MAX rather than wrapping;
    /// intermediate math is u128 so no overflow is reachable for valid
    /// durations.
    pub fn potential_reward(&self, weight: u64, duration: u64) -> u64 {
        let num = (weight as u128) * (duration as u128) * (self.annual_rate_bps as u128);
        let den = 10_000u128 * (SECONDS_PER_YEAR as u128);
        u64::try_from(num / den).unwrap_or(u64::MAX)
    }
}

/// Split a delegator's reward between the delegator and its validator
/// according to the validator's `shares` (parts per million). The division
/// remainder goes to the delegator; totals are conserved.
pub fn split_reward(total: u64, shares: u32) -> (u64 /*delegator*/, u64 /*validator*/) {
    let shares = shares.min(PERCENT_DENOMINATOR) as u128;
    let validator_cut = ((total as u128) * shares / (PERCENT_DENOMINATOR as u128)) as u64;
    (total - validator_cut, validator_cut)
}
