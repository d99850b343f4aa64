// Playback samples produced by the media poller
// One sample per poll period, describing what is currently playing

use serde::Deserialize;

/// Snapshot of the currently playing track
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct PlaybackSample {
    pub artist: String,
    pub title: String,
    #[serde(default)]
    pub album: String,
    /// Reported track length in seconds, often missing or garbage
    #[serde(default)]
    pub duration_seconds: Option<f64>,
    /// Current playhead position in seconds
    #[serde(default)]
    pub position_seconds: Option<f64>,
}

impl PlaybackSample {
    pub fn new(artist: impl Into<String>, title: impl Into<String>, album: impl Into<String>) -> Self {
        Self {
            artist: artist.into(),
            title: title.into(),
            album: album.into(),
            duration_seconds: None,
            position_seconds: None,
        }
    }

    pub fn with_duration(mut self, seconds: f64) -> Self {
        self.duration_seconds = Some(seconds);
        self
    }

    pub fn with_position(mut self, seconds: f64) -> Self {
        self.position_seconds = Some(seconds);
        self
    }

    pub fn identity(&self) -> TrackIdentity {
        TrackIdentity::of(self)
    }
}

/// Equality key used to notice track changes.
///
/// Built from the raw sample fields, so album/artist cleanup never affects it.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TrackIdentity(String);

impl TrackIdentity {
    pub fn of(sample: &PlaybackSample) -> Self {
        Self(format!("{}{}{}", sample.artist, sample.title, sample.album))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identity_uses_all_three_fields() {
        let a = PlaybackSample::new("Artist", "Song", "Album");
        let b = PlaybackSample::new("Artist", "Song", "Album - Single");
        assert_ne!(a.identity(), b.identity());
        assert_eq!(a.identity(), a.clone().with_position(42.0).identity());
    }

    #[test]
    fn deserializes_with_optional_fields_missing() {
        let sample: PlaybackSample =
            serde_json::from_str(r#"{"artist":"A","title":"T"}"#).unwrap();
        assert_eq!(sample.album, "");
        assert_eq!(sample.duration_seconds, None);
        assert_eq!(sample.position_seconds, None);

        let sample: PlaybackSample = serde_json::from_str(
            r#"{"artist":"A","title":"T","album":"L","duration_seconds":200,"position_seconds":12.5}"#,
        )
        .unwrap();
        assert_eq!(sample.duration_seconds, Some(200.0));
        assert_eq!(sample.position_seconds, Some(12.5));
    }
}
