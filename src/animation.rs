use serde::{Deserialize, Serialize};

/// One decoded frame of an animated cursor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnimationFrame {
    /// Encoded image of the frame.
    pub image: String,
    pub delay_ms: u32,
}

/// Everything needed to play an animated cursor preview.
///
/// The caches store and hand these out without looking inside.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnimationData {
    pub frames: Vec<AnimationFrame>,
    #[serde(default)]
    pub width: u32,
    #[serde(default)]
    pub height: u32,
}
