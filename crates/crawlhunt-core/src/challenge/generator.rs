//! Dynamic challenge generation and eligibility.

use chrono::{DateTime, Duration, Utc};
use rand::seq::SliceRandom;
use rand::Rng;
use tokio::sync::watch;
use tracing::{debug, info};
use uuid::Uuid;

use super::types::{DynamicChallenge, Hunt, HuntTask, Team};
use crate::error::ChallengeError;
use crate::location::{LocationSample, LocationSnapshot};
use crate::storage::{ChallengeConfig, LocationConfig};

const TITLES: &[&str] = &[
    "Team photo with the bartender",
    "Order the house special",
    "Find a stranger who knows the bar's history",
    "Toast with a rival team",
    "Get the DJ to shout out your team",
    "Recreate a famous album cover",
    "Learn a local's favorite drink",
    "Build a pyramid out of coasters",
];

/// Dynamic tasks are only completable until they expire or are completed.
pub fn is_eligible_for_completion(task: &HuntTask) -> bool {
    is_eligible_at(task, Utc::now())
}

pub fn is_eligible_at(task: &HuntTask, now: DateTime<Utc>) -> bool {
    task.is_dynamic && task.expires_at.is_some_and(|expires| expires > now) && !task.is_completed
}

/// Dynamic, eligible tasks scoped to `team_id`. Nothing is deleted here.
pub fn fetch_active_challenges_for_team(hunt: &Hunt, team_id: Uuid) -> Vec<&HuntTask> {
    fetch_active_challenges_at(hunt, team_id, Utc::now())
}

pub fn fetch_active_challenges_at(hunt: &Hunt, team_id: Uuid, now: DateTime<Utc>) -> Vec<&HuntTask> {
    hunt.tasks
        .iter()
        .filter(|task| task.team_id == Some(team_id) && is_eligible_at(task, now))
        .collect()
}

/// Synthesizes challenges stamped with the team's current position.
///
/// Reads the location engine's published snapshot; it never touches the
/// engine itself.
pub struct ChallengeGenerator {
    location: watch::Receiver<LocationSnapshot>,
    max_sample_age: Duration,
    config: ChallengeConfig,
}

impl ChallengeGenerator {
    pub fn new(
        location: watch::Receiver<LocationSnapshot>,
        location_config: &LocationConfig,
        config: &ChallengeConfig,
    ) -> Self {
        Self {
            location,
            max_sample_age: location_config.max_sample_age(),
            config: config.clone(),
        }
    }

    /// Create a challenge for `team` in `hunt` at the current location.
    ///
    /// Waits up to `location_wait_ms` for a fresh fix, then fails with
    /// [`ChallengeError::LocationUnavailable`]. The caller attaches the
    /// result to the hunt.
    pub async fn generate_team_challenge(
        &self,
        hunt: &Hunt,
        team: &Team,
    ) -> Result<DynamicChallenge, ChallengeError> {
        let (min, max) = (self.config.min_points, self.config.max_points);
        if min > max {
            return Err(ChallengeError::InvalidPointsRange { min, max });
        }

        let sample = self.await_recent_sample().await?;
        let now = Utc::now();
        let (title, points) = {
            let mut rng = rand::thread_rng();
            let title = TITLES.choose(&mut rng).copied().unwrap_or("Bonus round");
            (title.to_string(), rng.gen_range(min..=max))
        };

        let challenge = DynamicChallenge {
            id: Uuid::new_v4(),
            hunt_id: hunt.id,
            team_id: team.id,
            title,
            points,
            coordinate: sample.coordinate,
            created_at: now,
            expires_at: now + self.config.expiry(),
            is_dynamic: true,
        };
        info!(
            challenge = %challenge.id,
            hunt = %hunt.id,
            team = %team.id,
            points,
            "generated dynamic challenge"
        );
        Ok(challenge)
    }

    async fn await_recent_sample(&self) -> Result<LocationSample, ChallengeError> {
        let max_age = self.max_sample_age;
        let fresh = move |snapshot: &LocationSnapshot| {
            snapshot
                .current_location
                .as_ref()
                .filter(|sample| Utc::now() - sample.timestamp <= max_age)
                .cloned()
        };

        let current = fresh(&*self.location.borrow());
        if let Some(sample) = current {
            return Ok(sample);
        }

        debug!(wait_ms = self.config.location_wait_ms, "waiting for a location fix");
        let mut rx = self.location.clone();
        let waited = tokio::time::timeout(
            self.config.location_wait(),
            rx.wait_for(|snapshot| fresh(snapshot).is_some()),
        )
        .await;
        match waited {
            Ok(Ok(snapshot)) => fresh(&*snapshot).ok_or(ChallengeError::LocationUnavailable),
            _ => Err(ChallengeError::LocationUnavailable),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geo::Coordinate;

    fn dynamic_task(hunt: &Hunt, team: Uuid, expires_at: DateTime<Utc>) -> HuntTask {
        HuntTask {
            is_dynamic: true,
            team_id: Some(team),
            expires_at: Some(expires_at),
            ..HuntTask::authored(hunt.id, "bonus", 100)
        }
    }

    fn located(lat: f64, lon: f64) -> LocationSnapshot {
        LocationSnapshot {
            current_location: Some(LocationSample::at(Coordinate::new(lat, lon), Utc::now())),
            ..LocationSnapshot::default()
        }
    }

    #[test]
    fn eligibility_boundary() {
        let hunt = Hunt::new("Friday crawl");
        let team = Uuid::new_v4();
        let now = Utc::now();
        assert!(is_eligible_at(&dynamic_task(&hunt, team, now + Duration::seconds(1)), now));
        assert!(!is_eligible_at(&dynamic_task(&hunt, team, now - Duration::seconds(1)), now));
        assert!(!is_eligible_at(&dynamic_task(&hunt, team, now), now));
    }

    #[test]
    fn completed_or_authored_tasks_are_ineligible() {
        let hunt = Hunt::new("Friday crawl");
        let now = Utc::now();
        let mut done = dynamic_task(&hunt, Uuid::new_v4(), now + Duration::hours(1));
        done.is_completed = true;
        assert!(!is_eligible_at(&done, now));
        assert!(!is_eligible_at(&HuntTask::authored(hunt.id, "static", 10), now));
    }

    #[test]
    fn active_challenges_are_team_scoped() {
        let mut hunt = Hunt::new("Friday crawl");
        let ours = Uuid::new_v4();
        let theirs = Uuid::new_v4();
        let now = Utc::now();

        hunt.tasks.push(dynamic_task(&hunt, ours, now + Duration::minutes(30)));
        hunt.tasks.push(dynamic_task(&hunt, ours, now - Duration::minutes(1)));
        hunt.tasks.push(dynamic_task(&hunt, theirs, now + Duration::minutes(30)));
        hunt.tasks.push(HuntTask::authored(hunt.id, "static", 10));

        let active = fetch_active_challenges_at(&hunt, ours, now);
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].team_id, Some(ours));
        // Expired tasks stay in the hunt.
        assert_eq!(hunt.tasks.len(), 4);
    }

    #[tokio::test]
    async fn generates_stamped_challenge() {
        let (_tx, rx) = watch::channel(located(25.123, -80.456));
        let generator = ChallengeGenerator::new(rx, &LocationConfig::default(), &ChallengeConfig::default());
        let hunt = Hunt::new("Friday crawl");
        let team = Team::new("Hop Scotch");

        let before = Utc::now();
        let challenge = generator.generate_team_challenge(&hunt, &team).await.unwrap();
        assert_eq!(challenge.hunt_id, hunt.id);
        assert_eq!(challenge.team_id, team.id);
        assert!(challenge.is_dynamic);
        assert_eq!(challenge.coordinate, Coordinate::new(25.123, -80.456));
        assert!((50..=150).contains(&challenge.points));
        assert!(challenge.expires_at >= before + Duration::minutes(60));
        assert_eq!(challenge.expires_at - challenge.created_at, Duration::minutes(60));
    }

    #[tokio::test]
    async fn fails_without_location() {
        let (_tx, rx) = watch::channel(LocationSnapshot::default());
        let config = ChallengeConfig {
            location_wait_ms: 10,
            ..ChallengeConfig::default()
        };
        let generator = ChallengeGenerator::new(rx, &LocationConfig::default(), &config);
        let err = generator
            .generate_team_challenge(&Hunt::new("h"), &Team::new("t"))
            .await
            .unwrap_err();
        assert_eq!(err, ChallengeError::LocationUnavailable);
    }

    #[tokio::test]
    async fn stale_sample_counts_as_unavailable() {
        let mut snapshot = located(25.0, -80.0);
        if let Some(sample) = snapshot.current_location.as_mut() {
            sample.timestamp = Utc::now() - Duration::hours(2);
        }
        let (_tx, rx) = watch::channel(snapshot);
        let config = ChallengeConfig {
            location_wait_ms: 0,
            ..ChallengeConfig::default()
        };
        let generator = ChallengeGenerator::new(rx, &LocationConfig::default(), &config);
        assert!(generator
            .generate_team_challenge(&Hunt::new("h"), &Team::new("t"))
            .await
            .is_err());
    }

    #[tokio::test]
    async fn unbounded_sample_age_accepts_any_fix() {
        let mut snapshot = located(25.0, -80.0);
        if let Some(sample) = snapshot.current_location.as_mut() {
            sample.timestamp = Utc::now() - Duration::days(30);
        }
        let (_tx, rx) = watch::channel(snapshot);
        let location = LocationConfig {
            max_sample_age_secs: u64::MAX,
            ..LocationConfig::default()
        };
        let generator = ChallengeGenerator::new(rx, &location, &ChallengeConfig::default());
        let challenge = generator
            .generate_team_challenge(&Hunt::new("h"), &Team::new("t"))
            .await
            .unwrap();
        assert_eq!(challenge.coordinate, Coordinate::new(25.0, -80.0));
    }

    #[tokio::test]
    async fn waits_for_first_fix() {
        let (tx, rx) = watch::channel(LocationSnapshot::default());
        let generator = ChallengeGenerator::new(rx, &LocationConfig::default(), &ChallengeConfig::default());
        let hunt = Hunt::new("h");
        let team = Team::new("t");

        let publish = async {
            tokio::task::yield_now().await;
            tx.send_replace(located(40.0, -74.0));
        };
        let (result, _) = tokio::join!(generator.generate_team_challenge(&hunt, &team), publish);
        assert_eq!(result.unwrap().coordinate, Coordinate::new(40.0, -74.0));
    }

    #[tokio::test]
    async fn attached_challenge_is_active_for_team() {
        let (_tx, rx) = watch::channel(located(25.0, -80.0));
        let generator = ChallengeGenerator::new(rx, &LocationConfig::default(), &ChallengeConfig::default());
        let mut hunt = Hunt::new("h");
        let team = Team::new("t");
        let challenge = generator.generate_team_challenge(&hunt, &team).await.unwrap();
        let task = hunt.attach_challenge(challenge);
        assert!(is_eligible_for_completion(task));
        assert_eq!(fetch_active_challenges_for_team(&hunt, team.id).len(), 1);
    }

    #[tokio::test]
    async fn inverted_points_range_is_rejected() {
        let (_tx, rx) = watch::channel(located(25.0, -80.0));
        let config = ChallengeConfig {
            min_points: 200,
            max_points: 100,
            ..ChallengeConfig::default()
        };
        let generator = ChallengeGenerator::new(rx, &LocationConfig::default(), &config);
        assert_eq!(
            generator
                .generate_team_challenge(&Hunt::new("h"), &Team::new("t"))
                .await
                .unwrap_err(),
            ChallengeError::InvalidPointsRange { min: 200, max: 100 }
        );
    }
}
