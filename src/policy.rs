// Scrobble policy
// Decides from successive playback samples when to send "now playing" and when to scrobble

use crate::playback::{PlaybackSample, TrackIdentity};
use chrono::{DateTime, Utc};
use std::fmt;

/// Effective duration used when the poller reports none
pub const FALLBACK_DURATION: f64 = 120.0;
/// Reported durations above this are treated as corrupt metadata
pub const MAX_VALID_DURATION: f64 = 600.0;
/// Effective duration substituted for corrupt metadata
pub const INVALID_DURATION_OVERRIDE: f64 = 210.0;
/// Tracks shorter than this scrobble at half their length, ignoring the cap
pub const SHORT_SONG_DURATION: f64 = 75.0;
/// Absolute play time after which any regular track is eligible
pub const SCROBBLE_TIME_CAP: u64 = 120;

/// Where the effective duration came from. Only used for diagnostics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DurationSource {
    FallbackDefault,
    FallbackInvalid,
    ShortSong,
    Valid,
}

impl fmt::Display for DurationSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::FallbackDefault => "fallback-default",
            Self::FallbackInvalid => "fallback-invalid",
            Self::ShortSong => "short-song",
            Self::Valid => "valid",
        };
        f.write_str(label)
    }
}

/// Duration classification for one sample
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DurationPolicy {
    pub effective: f64,
    pub source: DurationSource,
}

impl DurationPolicy {
    /// Classify a reported duration. Non-finite values count as missing.
    pub fn classify(reported: Option<f64>) -> Self {
        match reported.filter(|d| d.is_finite()) {
            None => Self {
                effective: FALLBACK_DURATION,
                source: DurationSource::FallbackDefault,
            },
            Some(d) if d > MAX_VALID_DURATION => Self {
                effective: INVALID_DURATION_OVERRIDE,
                source: DurationSource::FallbackInvalid,
            },
            Some(d) if d < SHORT_SONG_DURATION => Self {
                effective: d,
                source: DurationSource::ShortSong,
            },
            Some(d) => Self {
                effective: d,
                source: DurationSource::Valid,
            },
        }
    }

    /// Elapsed play time (seconds) at which the track becomes eligible
    pub fn threshold(&self) -> f64 {
        let half = self.effective / 2.0;
        match self.source {
            DurationSource::ShortSong => half,
            _ => half.min(SCROBBLE_TIME_CAP as f64),
        }
    }

    pub fn is_eligible(&self, elapsed: u64) -> bool {
        elapsed as f64 >= self.threshold()
    }
}

/// True when the playhead jumped from the tail of the track back to its head
/// between two consecutive polls.
pub fn is_repeat(current: Option<f64>, effective_duration: f64, previous: f64, poll_period: u64) -> bool {
    let Some(current) = current else {
        return false;
    };
    let band = 1.5 * poll_period as f64;
    current <= band && previous >= effective_duration - band
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlayState {
    NewTrack,
    Playing,
    Scrobbled,
}

/// Progress of one occurrence of a track
#[derive(Debug, Clone)]
pub struct TrackProgress {
    pub identity: TrackIdentity,
    pub state: PlayState,
    /// Polled play time in seconds, advanced one poll period per sample
    pub elapsed: u64,
    pub last_position: f64,
    pub started_at: DateTime<Utc>,
}

impl TrackProgress {
    fn begin(identity: TrackIdentity, state: PlayState, elapsed: u64, position: f64) -> Self {
        Self {
            identity,
            state,
            elapsed,
            last_position: position,
            started_at: Utc::now(),
        }
    }

    pub fn has_scrobbled(&self) -> bool {
        self.state == PlayState::Scrobbled
    }
}

/// What the caller should send for the sample just observed
#[derive(Debug, Clone, PartialEq)]
pub enum Decision {
    Idle,
    NowPlaying,
    /// Submit a scrobble; report success back with [`ScrobblePolicy::mark_scrobbled`]
    Scrobble { started_at: DateTime<Utc> },
}

/// Per-backend scrobble state machine
#[derive(Debug)]
pub struct ScrobblePolicy {
    name: String,
    poll_period: u64,
    progress: Option<TrackProgress>,
}

impl ScrobblePolicy {
    pub fn new(name: impl Into<String>, poll_period: u64) -> Self {
        Self {
            name: name.into(),
            poll_period,
            progress: None,
        }
    }

    pub fn poll_period(&self) -> u64 {
        self.poll_period
    }

    pub fn progress(&self) -> Option<&TrackProgress> {
        self.progress.as_ref()
    }

    pub fn state(&self) -> PlayState {
        self.progress
            .as_ref()
            .map_or(PlayState::NewTrack, |p| p.state)
    }

    /// Feed one sample through the state machine
    pub fn observe(&mut self, sample: &PlaybackSample) -> Decision {
        let identity = sample.identity();
        let duration = DurationPolicy::classify(sample.duration_seconds);
        let position = sample.position_seconds.unwrap_or(0.0);
        let period = self.poll_period;

        let same_track = self
            .progress
            .as_ref()
            .is_some_and(|p| p.identity == identity);

        if !same_track {
            log::info!(
                "[{}] New track: {} - {} (duration {:.0}s, source {})",
                self.name,
                sample.artist,
                sample.title,
                duration.effective,
                duration.source
            );
            // The sample that revealed the track counts as its first poll period
            self.progress = Some(TrackProgress::begin(identity, PlayState::NewTrack, period, position));
            return Decision::NowPlaying;
        }

        let Some(progress) = self.progress.as_mut() else {
            return Decision::Idle;
        };

        progress.elapsed += period;
        if progress.state == PlayState::NewTrack {
            progress.state = PlayState::Playing;
        }
        let previous = progress.last_position;
        progress.last_position = position;

        log::debug!(
            "[{}] elapsed: {}s, scrobbled: {}, threshold: {:.1}s, eligible: {}",
            self.name,
            progress.elapsed,
            progress.has_scrobbled(),
            duration.threshold(),
            duration.is_eligible(progress.elapsed)
        );

        if progress.has_scrobbled()
            && is_repeat(sample.position_seconds, duration.effective, previous, period)
        {
            if progress.elapsed > period {
                log::info!(
                    "[{}] Repeat detected: {} - {} (position {:.1}s, previous {:.1}s)",
                    self.name,
                    sample.artist,
                    sample.title,
                    position,
                    previous
                );
                *progress = TrackProgress::begin(progress.identity.clone(), PlayState::Playing, 0, position);
            } else {
                log::debug!("[{}] Repeat pending, waiting one more poll period", self.name);
            }
        }

        if !progress.has_scrobbled() && duration.is_eligible(progress.elapsed) {
            // repeated on every tick while the scrobble is held back
            log::debug!(
                "[{}] Eligible for scrobble: {} - {} (played {}s / {:.0}s, source {})",
                self.name,
                sample.artist,
                sample.title,
                progress.elapsed,
                duration.effective,
                duration.source
            );
            return Decision::Scrobble {
                started_at: progress.started_at,
            };
        }

        Decision::Idle
    }

    /// Record that the scrobble for the current occurrence was accepted
    pub fn mark_scrobbled(&mut self) {
        if let Some(progress) = self.progress.as_mut() {
            progress.state = PlayState::Scrobbled;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PERIOD: u64 = 5;

    fn first_eligible(policy: DurationPolicy) -> u64 {
        (0..=1000).find(|&e| policy.is_eligible(e)).unwrap()
    }

    /// Feed samples and report the decisions, marking scrobbles as accepted
    fn play(policy: &mut ScrobblePolicy, samples: &[PlaybackSample]) -> Vec<Decision> {
        samples
            .iter()
            .map(|s| {
                let decision = policy.observe(s);
                if matches!(decision, Decision::Scrobble { .. }) {
                    policy.mark_scrobbled();
                }
                decision
            })
            .collect()
    }

    fn song(duration: Option<f64>, positions: impl IntoIterator<Item = u64>) -> Vec<PlaybackSample> {
        positions
            .into_iter()
            .map(|p| {
                let mut sample = PlaybackSample::new("Artist", "Song", "Album").with_position(p as f64);
                sample.duration_seconds = duration;
                sample
            })
            .collect()
    }

    fn scrobble_indices(decisions: &[Decision]) -> Vec<usize> {
        decisions
            .iter()
            .enumerate()
            .filter(|(_, d)| matches!(d, Decision::Scrobble { .. }))
            .map(|(i, _)| i)
            .collect()
    }

    #[test]
    fn classifies_durations() {
        assert_eq!(DurationPolicy::classify(None).source, DurationSource::FallbackDefault);
        assert_eq!(DurationPolicy::classify(None).effective, 120.0);
        assert_eq!(DurationPolicy::classify(Some(601.0)).source, DurationSource::FallbackInvalid);
        assert_eq!(DurationPolicy::classify(Some(3600.0)).effective, 210.0);
        assert_eq!(DurationPolicy::classify(Some(74.0)).source, DurationSource::ShortSong);
        assert_eq!(DurationPolicy::classify(Some(75.0)).source, DurationSource::Valid);
        assert_eq!(DurationPolicy::classify(Some(600.0)).effective, 600.0);
        assert_eq!(DurationPolicy::classify(Some(f64::NAN)).source, DurationSource::FallbackDefault);
        assert_eq!(DurationSource::FallbackInvalid.to_string(), "fallback-invalid");
    }

    #[test]
    fn zero_and_negative_durations_are_short_songs() {
        for d in [0.0, -3.0] {
            let policy = DurationPolicy::classify(Some(d));
            assert_eq!(policy.source, DurationSource::ShortSong);
            assert_eq!(policy.effective, d);
            assert!(policy.is_eligible(0));
        }
        assert_eq!(
            DurationPolicy::classify(Some(f64::INFINITY)).source,
            DurationSource::FallbackDefault
        );

        // eligible on the first tick after now playing
        let mut policy = ScrobblePolicy::new("test", PERIOD);
        let decisions = play(&mut policy, &song(Some(0.0), [5, 10]));
        assert_eq!(scrobble_indices(&decisions), vec![1]);
    }

    #[test]
    fn regular_tracks_become_eligible_at_half_or_cap() {
        for d in [75u64, 100, 200, 239, 240, 241, 300, 599, 600] {
            let policy = DurationPolicy::classify(Some(d as f64));
            let expected = ((d as f64) / 2.0).min(120.0).ceil() as u64;
            assert_eq!(first_eligible(policy), expected, "duration {}", d);
        }
    }

    #[test]
    fn short_tracks_ignore_the_cap() {
        let policy = DurationPolicy::classify(Some(60.0));
        assert!(!policy.is_eligible(29));
        assert!(policy.is_eligible(30));
        assert_eq!(first_eligible(DurationPolicy::classify(Some(74.0))), 37);
    }

    #[test]
    fn fallback_durations_replace_raw_value() {
        assert_eq!(first_eligible(DurationPolicy::classify(None)), 60);
        assert_eq!(first_eligible(DurationPolicy::classify(Some(10_000.0))), 105);
    }

    #[test]
    fn repeat_requires_wrap_from_tail_to_head() {
        assert!(is_repeat(Some(3.0), 200.0, 195.0, PERIOD));
        assert!(is_repeat(Some(7.5), 200.0, 192.5, PERIOD));
        assert!(!is_repeat(Some(8.0), 200.0, 195.0, PERIOD));
        assert!(!is_repeat(Some(3.0), 200.0, 150.0, PERIOD));
        assert!(!is_repeat(None, 200.0, 195.0, PERIOD));
    }

    #[test]
    fn scrobbles_once_at_half_duration() {
        let mut policy = ScrobblePolicy::new("test", PERIOD);
        let decisions = play(&mut policy, &song(Some(200.0), (1..=20).map(|i| i * 5)));

        assert_eq!(decisions[0], Decision::NowPlaying);
        assert_eq!(
            decisions.iter().filter(|d| **d == Decision::NowPlaying).count(),
            1
        );
        assert_eq!(scrobble_indices(&decisions), vec![19]);
        assert_eq!(policy.state(), PlayState::Scrobbled);
        assert_eq!(policy.progress().unwrap().elapsed, 100);
    }

    #[test]
    fn missing_duration_scrobbles_at_sixty_seconds() {
        let mut policy = ScrobblePolicy::new("test", PERIOD);
        let decisions = play(&mut policy, &song(None, (1..=30).map(|i| i * 5)));
        // elapsed reaches 60 on the 12th sample
        assert_eq!(scrobble_indices(&decisions), vec![11]);
    }

    #[test]
    fn unchanged_samples_never_scrobble_twice() {
        let mut policy = ScrobblePolicy::new("test", PERIOD);
        let samples = song(Some(100.0), std::iter::repeat(50).take(60));
        let decisions = play(&mut policy, &samples);
        assert_eq!(scrobble_indices(&decisions).len(), 1);
    }

    #[test]
    fn failed_scrobble_is_retried_on_next_tick() {
        let mut policy = ScrobblePolicy::new("test", PERIOD);
        let samples = song(Some(20.0), [5, 10, 15]);
        assert_eq!(policy.observe(&samples[0]), Decision::NowPlaying);
        // elapsed 10 >= 10, submission fails so nothing is marked
        assert!(matches!(policy.observe(&samples[1]), Decision::Scrobble { .. }));
        assert_eq!(policy.state(), PlayState::Playing);
        assert!(matches!(policy.observe(&samples[2]), Decision::Scrobble { .. }));
        policy.mark_scrobbled();
        assert_eq!(policy.state(), PlayState::Scrobbled);
    }

    #[test]
    fn track_change_resets_before_eligibility() {
        let mut policy = ScrobblePolicy::new("test", PERIOD);
        play(&mut policy, &song(Some(60.0), (1..=10).map(|i| i * 5)));
        assert_eq!(policy.state(), PlayState::Scrobbled);

        let other = PlaybackSample::new("Artist", "Other Song", "Album")
            .with_duration(60.0)
            .with_position(5.0);
        assert_eq!(policy.observe(&other), Decision::NowPlaying);
        let progress = policy.progress().unwrap();
        assert_eq!(progress.state, PlayState::NewTrack);
        assert_eq!(progress.elapsed, PERIOD);
        assert!(!progress.has_scrobbled());
    }

    #[test]
    fn repeat_allows_a_second_scrobble() {
        let mut policy = ScrobblePolicy::new("test", PERIOD);
        let first_pass = song(Some(200.0), (1..=39).map(|i| i * 5));
        let decisions = play(&mut policy, &first_pass);
        assert_eq!(scrobble_indices(&decisions), vec![19]);

        // wraps from 195 back to 3, then plays another 100 seconds
        let second_pass = song(Some(200.0), std::iter::once(3).chain((1..=20).map(|i| 3 + i * 5)));
        let decisions = play(&mut policy, &second_pass);
        assert_eq!(decisions[0], Decision::Idle);
        assert_eq!(scrobble_indices(&decisions), vec![20]);
        assert!(!decisions.contains(&Decision::NowPlaying));
    }

    #[test]
    fn repeat_only_resets_after_scrobble() {
        let mut policy = ScrobblePolicy::new("test", PERIOD);
        let decisions = play(&mut policy, &song(Some(20.0), [5, 17, 2]));
        // scrobbled on the second sample; the wrap on the third resets to Playing
        assert_eq!(scrobble_indices(&decisions), vec![1]);
        assert_eq!(policy.state(), PlayState::Playing);
        assert_eq!(policy.progress().unwrap().elapsed, 0);

        let mut policy = ScrobblePolicy::new("test", PERIOD);
        let decisions = play(&mut policy, &song(Some(200.0), [195, 2]));
        assert!(scrobble_indices(&decisions).is_empty());
        assert_eq!(policy.progress().unwrap().elapsed, 10);
    }

    #[test]
    fn skipped_track_never_scrobbles() {
        let mut policy = ScrobblePolicy::new("test", PERIOD);
        let mut decisions = play(&mut policy, &song(Some(300.0), (1..=10).map(|i| i * 5)));
        let next = PlaybackSample::new("Other", "Song", "Album").with_duration(300.0);
        decisions.push(policy.observe(&next));
        assert!(scrobble_indices(&decisions).is_empty());
    }
}
