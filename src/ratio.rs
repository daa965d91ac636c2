use regex::Regex;
use std::sync::OnceLock;

pub const UNCONSTRAINED_LABEL: &str = "unconstrained";

/// Fixed choices offered to front ends. `parse_ratio` also accepts any
/// other `W:H` label so new choices do not require an engine change.
pub const ASPECT_RATIO_CHOICES: &[&str] =
    &[UNCONSTRAINED_LABEL, "1:1", "4:3", "16:9", "9:16"];

pub const MIN_TOLERANCE: f64 = 0.1;
pub const MAX_TOLERANCE: f64 = 0.5;
pub const DEFAULT_TOLERANCE: f64 = 0.2;

static RATIO_RE: OnceLock<Regex> = OnceLock::new();

/// Target width/height ratio; `None` means no filtering. Tolerance is
/// supplied per run, not embedded here.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct AspectRatioTarget {
    pub ratio: Option<f64>,
}

/// A `W:H` pattern (positive integers) anywhere in the label yields
/// `W/H`. The unconstrained sentinel and any unrecognized label fall back
/// to no constraint rather than failing.
pub fn parse_ratio(label: &str) -> AspectRatioTarget {
    let re = RATIO_RE.get_or_init(|| Regex::new(r"(\d+):(\d+)").expect("ratio regex"));

    let Some(captures) = re.captures(label) else {
        return AspectRatioTarget::default();
    };
    let width: u32 = match captures[1].parse() {
        Ok(value) => value,
        Err(_) => return AspectRatioTarget::default(),
    };
    let height: u32 = match captures[2].parse() {
        Ok(value) => value,
        Err(_) => return AspectRatioTarget::default(),
    };
    if width == 0 || height == 0 {
        return AspectRatioTarget::default();
    }

    AspectRatioTarget {
        ratio: Some(f64::from(width) / f64::from(height)),
    }
}

/// True when the image dimensions fall within `tolerance` of the target
/// ratio, or when there is no target. A zero height cannot come out of a
/// successful decode but is guarded as a non-match anyway.
pub fn matches(width: u32, height: u32, target: &AspectRatioTarget, tolerance: f64) -> bool {
    let Some(ratio) = target.ratio else {
        return true;
    };
    if height == 0 {
        return false;
    }
    (f64::from(width) / f64::from(height) - ratio).abs() <= tolerance
}
