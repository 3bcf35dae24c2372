use serde::Serialize;
use std::collections::HashSet;
use thiserror::Error;

/// One rung of the encoding ladder.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Rendition {
    pub name: String,
    pub width: u32,
    pub height: u32,
    pub video_kbps: u32,
}

impl Rendition {
    pub fn new(name: &str, width: u32, height: u32, video_kbps: u32) -> Self {
        Self {
            name: name.to_string(),
            width,
            height,
            video_kbps,
        }
    }

    /// Declared peak bandwidth in bits per second: configured bitrate plus 20%.
    pub fn peak_bandwidth(&self) -> u64 {
        u64::from(self.video_kbps) * 1000 * 6 / 5
    }

    pub fn resolution(&self) -> String {
        format!("{}x{}", self.width, self.height)
    }

    pub fn playlist_name(&self) -> String {
        format!("{}.m3u8", self.name)
    }

    /// ffmpeg pattern for this rung's segments, e.g. `720p_%03d.ts`.
    pub fn segment_pattern(&self) -> String {
        format!("{}_%03d.ts", self.name)
    }
}

#[derive(Debug, Error, PartialEq)]
pub enum LadderError {
    #[error("ladder is empty")]
    Empty,
    #[error("malformed rung '{0}', expected name:WIDTHxHEIGHT:KBPS")]
    Malformed(String),
    #[error("rung '{0}' has a zero dimension or bitrate")]
    Zero(String),
    #[error("duplicate rung name '{0}'")]
    Duplicate(String),
}

pub fn default_ladder() -> Vec<Rendition> {
    vec![
        Rendition::new("1080p", 1920, 1080, 5000),
        Rendition::new("720p", 1280, 720, 2800),
        Rendition::new("480p", 854, 480, 1400),
        Rendition::new("360p", 640, 360, 800),
        Rendition::new("240p", 426, 240, 400),
    ]
}

/// Parses `1080p:1920x1080:5000,720p:1280x720:2800,...`.
pub fn parse_ladder(raw: &str) -> Result<Vec<Rendition>, LadderError> {
    let mut seen = HashSet::new();
    let mut ladder = Vec::new();

    for rung in raw.split(',').map(str::trim).filter(|r| !r.is_empty()) {
        let rendition = parse_rung(rung)?;
        if !seen.insert(rendition.name.clone()) {
            return Err(LadderError::Duplicate(rendition.name));
        }
        ladder.push(rendition);
    }

    if ladder.is_empty() {
        return Err(LadderError::Empty);
    }
    Ok(ladder)
}

fn parse_rung(rung: &str) -> Result<Rendition, LadderError> {
    let malformed = || LadderError::Malformed(rung.to_string());

    let mut parts = rung.split(':');
    let (name, size, kbps) = match (parts.next(), parts.next(), parts.next(), parts.next()) {
        (Some(n), Some(s), Some(k), None) => (n.trim(), s.trim(), k.trim()),
        _ => return Err(malformed()),
    };

    // The name doubles as a file prefix.
    if name.is_empty() || !name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-') {
        return Err(malformed());
    }

    let (w, h) = size.split_once('x').ok_or_else(malformed)?;
    let width: u32 = w.parse().map_err(|_| malformed())?;
    let height: u32 = h.parse().map_err(|_| malformed())?;
    let video_kbps: u32 = kbps.trim_end_matches('k').parse().map_err(|_| malformed())?;

    if width == 0 || height == 0 || video_kbps == 0 {
        return Err(LadderError::Zero(name.to_string()));
    }

    Ok(Rendition::new(name, width, height, video_kbps))
}
