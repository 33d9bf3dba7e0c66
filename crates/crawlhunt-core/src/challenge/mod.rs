//! Hunts, bar crawls, and the dynamic challenge generator.

pub mod generator;
pub mod types;

pub use generator::{
    fetch_active_challenges_at, fetch_active_challenges_for_team, is_eligible_at,
    is_eligible_for_completion, ChallengeGenerator,
};
pub use types::{BarCrawl, BarStop, DynamicChallenge, Hunt, HuntTask, Team};
