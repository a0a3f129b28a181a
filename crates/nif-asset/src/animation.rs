use glam::{Quat, Vec3};

/// Keyframe on the 1-based frame timeline.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AnimationKeyFrame<T> {
    pub frame: u32,
    pub value: T,
}

/// Sparse, independently keyed transform channels, sorted by frame.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TransformAnimation {
    pub translation: Vec<AnimationKeyFrame<Vec3>>,
    pub rotation: Vec<AnimationKeyFrame<Quat>>,
    pub scale: Vec<AnimationKeyFrame<f32>>,
}

impl TransformAnimation {
    pub fn is_empty(&self) -> bool {
        self.translation.is_empty() && self.rotation.is_empty() && self.scale.is_empty()
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Extrapolation {
    #[default]
    Constant,
    Cyclic,
}

// Absorbs float error in products such as 0.1 * 30.
const FRAME_EPSILON: f64 = 1e-4;

/// Map a time in seconds to a frame. Time 0 is frame 1.
pub fn frame_for_time(time: f32, frames_per_second: f32) -> u32 {
    let frame = (time as f64 * frames_per_second as f64 + FRAME_EPSILON).floor();
    1 + frame.max(0.0) as u32
}

/// Insert a key, replacing one already at the same frame.
pub fn insert_key<T>(keys: &mut Vec<AnimationKeyFrame<T>>, frame: u32, value: T) {
    match keys.binary_search_by_key(&frame, |key| key.frame) {
        Ok(position) => keys[position].value = value,
        Err(position) => keys.insert(position, AnimationKeyFrame { frame, value }),
    }
}

/// Value keyed at `frame`; otherwise the closest earlier key, otherwise the first.
pub fn key_at_or_before<T: Copy>(keys: &[AnimationKeyFrame<T>], frame: u32) -> Option<T> {
    keys.iter()
        .take_while(|key| key.frame <= frame)
        .last()
        .or_else(|| keys.first())
        .map(|key| key.value)
}
